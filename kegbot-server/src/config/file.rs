//! TOML file configuration structures.
//!
//! These structs directly map to the `kegbot.toml` file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub core: CoreSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub taps: Vec<TapSection>,
    #[serde(default)]
    pub devices: Vec<DeviceSection>,
    /// Overrides for the built-in auth device policies, keyed by device name.
    #[serde(default)]
    pub auth_devices: BTreeMap<String, AuthDeviceSection>,
    /// Static token bindings, only used by the memory backend.
    #[serde(default)]
    pub tokens: Vec<TokenSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSection {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_min_volume_ml")]
    pub min_volume_to_record_ml: f64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            min_volume_to_record_ml: default_min_volume_ml(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    10
}

fn default_min_volume_ml() -> f64 {
    10.0
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_event_buffer() -> usize {
    256
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Web,
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default)]
    pub kind: BackendKind,
    /// Base URL of the kegweb API, e.g. `http://localhost:8000/api/`.
    #[serde(default)]
    pub api_url: Option<Url>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Register every tap the backend knows about at startup.
    #[serde(default)]
    pub load_taps: bool,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            api_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            load_taps: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapSection {
    pub name: String,
    pub ml_per_tick: f64,
    /// Defaults to 500 mL worth of ticks.
    #[serde(default)]
    pub max_tick_delta: Option<u64>,
    #[serde(default)]
    pub relay: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    pub name: String,
    /// Serial port, FIFO or `-` for stdin.
    pub path: String,
    #[serde(default)]
    pub poll_timeout_ms: Option<u64>,
    #[serde(default)]
    pub reopen_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthDeviceSection {
    #[serde(default)]
    pub captive: Option<bool>,
    #[serde(default)]
    pub max_idle_secs: Option<u64>,
    #[serde(default)]
    pub grace_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSection {
    pub auth_device: String,
    pub token_value: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
