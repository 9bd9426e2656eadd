//! Configuration module for kegbot-server.
//!
//! Handles loading configuration from the TOML file and converting it into
//! the runtime types the core understands.

pub mod file;

use crate::config::file::{
    AuthDeviceSection, BackendKind, DeviceSection, FileConfig, TapSection, TokenSection,
};
use kegbot_sdk::config::{AuthDevicePolicy, AuthPolicyTable, CoreConfig, DeviceConfig, TapConfig};
use kegbot_sdk::objects::{AuthToken, TapInfo};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Backend connection settings.
#[derive(Debug, Clone)]
pub enum BackendSettings {
    Web {
        api_url: Url,
        api_key: Option<String>,
        timeout: Duration,
    },
    Memory {
        tokens: Vec<AuthToken>,
    },
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub core: CoreConfig,
    pub backend: BackendSettings,
    pub load_backend_taps: bool,
    pub taps: Vec<TapConfig>,
    pub devices: Vec<DeviceConfig>,
    pub auth_policies: AuthPolicyTable,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        parse_config(&config_content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<LoadedConfig, ConfigError> {
    let file_config: FileConfig = toml::from_str(content)?;
    validate(&file_config)?;
    Ok(build_loaded_config(file_config))
}

/// Combine configured taps with the taps the backend reports.
///
/// Backend taps are keyed by their meter name. A tap present in both keeps
/// the configured settings.
pub fn merge_backend_taps(mut taps: Vec<TapConfig>, backend_taps: Vec<TapInfo>) -> Vec<TapConfig> {
    let mut known: HashSet<String> = taps.iter().map(|t| t.name.clone()).collect();
    for info in backend_taps {
        if info.ml_per_tick <= 0.0 || !info.ml_per_tick.is_finite() {
            tracing::warn!(tap = %info.meter_name, "Skipping backend tap with invalid ml_per_tick");
            continue;
        }
        if !known.insert(info.meter_name.clone()) {
            continue;
        }
        let mut tap = TapConfig::new(info.meter_name, info.ml_per_tick);
        tap.relay_name = info.relay_name;
        taps.push(tap);
    }
    taps
}

// -- Private helpers ---

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.core.heartbeat_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "core.heartbeat_interval_ms must be positive".to_string(),
        ));
    }
    if config.core.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "core.event_buffer must be positive".to_string(),
        ));
    }
    if config.backend.kind == BackendKind::Web && config.backend.api_url.is_none() {
        return Err(ConfigError::ValidationError(
            "backend.api_url is required for the web backend".to_string(),
        ));
    }

    let mut tap_names = HashSet::new();
    for tap in &config.taps {
        if !tap_names.insert(tap.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "tap {} is configured more than once",
                tap.name
            )));
        }
        if tap.ml_per_tick <= 0.0 || !tap.ml_per_tick.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "tap {} has invalid ml_per_tick {}",
                tap.name, tap.ml_per_tick
            )));
        }
    }

    let mut device_names = HashSet::new();
    for device in &config.devices {
        if !device_names.insert(device.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "device {} is configured more than once",
                device.name
            )));
        }
        if device.path.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "device {} has an empty path",
                device.name
            )));
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let core = CoreConfig {
        idle_timeout: Duration::from_secs(file_config.core.idle_timeout_secs),
        min_volume_to_record_ml: file_config.core.min_volume_to_record_ml,
        heartbeat_interval: Duration::from_millis(file_config.core.heartbeat_interval_ms),
        event_buffer: file_config.core.event_buffer,
    };

    let backend = match (file_config.backend.kind, file_config.backend.api_url) {
        (BackendKind::Web, Some(api_url)) => BackendSettings::Web {
            api_url,
            api_key: file_config.backend.api_key,
            timeout: Duration::from_secs(file_config.backend.timeout_secs),
        },
        _ => BackendSettings::Memory {
            tokens: file_config.tokens.into_iter().map(convert_token).collect(),
        },
    };

    let mut auth_policies = AuthPolicyTable::default();
    for (name, section) in file_config.auth_devices {
        let policy = apply_policy_overrides(auth_policies.policy_for(&name).clone(), &section);
        auth_policies.insert(name, policy);
    }

    LoadedConfig {
        core,
        backend,
        load_backend_taps: file_config.backend.load_taps,
        taps: file_config.taps.into_iter().map(convert_tap).collect(),
        devices: file_config.devices.into_iter().map(convert_device).collect(),
        auth_policies,
    }
}

fn apply_policy_overrides(
    mut policy: AuthDevicePolicy,
    section: &AuthDeviceSection,
) -> AuthDevicePolicy {
    if let Some(captive) = section.captive {
        policy.captive = captive;
    }
    if let Some(secs) = section.max_idle_secs {
        policy.max_idle = Duration::from_secs(secs);
    }
    if let Some(secs) = section.grace_secs {
        policy.grace = Duration::from_secs(secs);
    }
    policy
}

fn convert_tap(t: TapSection) -> TapConfig {
    let mut tap = TapConfig::new(t.name, t.ml_per_tick);
    if let Some(max) = t.max_tick_delta {
        tap = tap.with_max_tick_delta(max);
    }
    if let Some(relay) = t.relay {
        tap = tap.with_relay(relay);
    }
    tap
}

fn convert_device(d: DeviceSection) -> DeviceConfig {
    let mut device = DeviceConfig::new(d.name, d.path);
    if let Some(ms) = d.poll_timeout_ms {
        device.poll_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = d.reopen_delay_ms {
        device.reopen_delay = Duration::from_millis(ms);
    }
    device
}

fn convert_token(t: TokenSection) -> AuthToken {
    AuthToken {
        auth_device: t.auth_device,
        token_value: t.token_value,
        username: t.username,
        enabled: t.enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kegbot_sdk::config::{AUTH_DEVICE_CORE_ONEWIRE, AUTH_DEVICE_CORE_RFID};
    use std::io::Write;

    const SAMPLE: &str = r#"
[core]
idle_timeout_secs = 30
heartbeat_interval_ms = 500

[[taps]]
name = "kegboard.flow0"
ml_per_tick = 2.0
relay = "kegboard.relay0"

[[devices]]
name = "kegboard"
path = "-"
reopen_delay_ms = 2000

[auth_devices."core.rfid"]
grace_secs = 3

[auth_devices."contrib.nfc"]
captive = false

[[tokens]]
auth_device = "core.onewire"
token_value = "1111"
username = "alice"
"#;

    #[test]
    fn test_load_converts_sections() {
        let loaded = parse_config(SAMPLE).unwrap();
        assert_eq!(loaded.core.idle_timeout, Duration::from_secs(30));
        assert_eq!(loaded.core.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(loaded.core.min_volume_to_record_ml, 10.0);

        assert_eq!(loaded.taps.len(), 1);
        assert_eq!(loaded.taps[0].max_tick_delta, 250);
        assert_eq!(loaded.taps[0].relay_name.as_deref(), Some("kegboard.relay0"));

        assert!(loaded.devices[0].is_stdin());
        assert_eq!(loaded.devices[0].reopen_delay, Duration::from_secs(2));
        assert_eq!(loaded.devices[0].poll_timeout, Duration::from_millis(500));

        match &loaded.backend {
            BackendSettings::Memory { tokens } => {
                assert_eq!(tokens.len(), 1);
                assert_eq!(tokens[0].username.as_deref(), Some("alice"));
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_auth_overrides_keep_builtin_defaults() {
        let loaded = parse_config(SAMPLE).unwrap();
        let rfid = loaded.auth_policies.policy_for(AUTH_DEVICE_CORE_RFID);
        assert_eq!(rfid.grace, Duration::from_secs(3));
        assert!(!rfid.captive);
        assert_eq!(rfid.max_idle, Duration::from_secs(20));

        let nfc = loaded.auth_policies.policy_for("contrib.nfc");
        assert!(!nfc.captive);
        assert_eq!(nfc.max_idle, Duration::from_secs(10));

        let onewire = loaded.auth_policies.policy_for(AUTH_DEVICE_CORE_ONEWIRE);
        assert_eq!(onewire.max_idle, Duration::from_secs(120));
    }

    #[test]
    fn test_duplicate_tap_rejected() {
        let toml_str = r#"
[[taps]]
name = "t"
ml_per_tick = 1.0

[[taps]]
name = "t"
ml_per_tick = 2.0
"#;
        assert!(matches!(
            parse_config(toml_str),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_ml_per_tick_rejected() {
        let toml_str = "[[taps]]\nname = \"t\"\nml_per_tick = 0.0\n";
        assert!(matches!(
            parse_config(toml_str),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_web_backend_requires_url() {
        assert!(matches!(
            parse_config("[backend]\nkind = \"web\"\n"),
            Err(ConfigError::ValidationError(_))
        ));

        let loaded = parse_config(
            "[backend]\nkind = \"web\"\napi_url = \"http://localhost:8000/api/\"\ntimeout_secs = 3\n",
        )
        .unwrap();
        match loaded.backend {
            BackendSettings::Web { api_url, timeout, .. } => {
                assert_eq!(api_url.as_str(), "http://localhost:8000/api/");
                assert_eq!(timeout, Duration::from_secs(3));
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_loader_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let loader = ConfigLoader::new(file.path());
        let loaded = loader.load().unwrap();
        assert_eq!(loaded.taps[0].name, "kegboard.flow0");

        let missing = ConfigLoader::new("/nonexistent/kegbot.toml");
        assert!(matches!(missing.load(), Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_merge_backend_taps() {
        let configured = vec![TapConfig::new("kegboard.flow0", 2.0)];
        let backend = vec![
            TapInfo {
                name: "Main".to_string(),
                meter_name: "kegboard.flow0".to_string(),
                ml_per_tick: 5.0,
                relay_name: None,
            },
            TapInfo {
                name: "Second".to_string(),
                meter_name: "kegboard.flow1".to_string(),
                ml_per_tick: 2.5,
                relay_name: Some("kegboard.relay1".to_string()),
            },
            TapInfo {
                name: "Broken".to_string(),
                meter_name: "kegboard.flow2".to_string(),
                ml_per_tick: 0.0,
                relay_name: None,
            },
        ];

        let merged = merge_backend_taps(configured, backend);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].ml_per_tick, 2.0);
        assert_eq!(merged[1].name, "kegboard.flow1");
        assert_eq!(merged[1].relay_name.as_deref(), Some("kegboard.relay1"));
    }
}
