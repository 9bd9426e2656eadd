//! Per-auth-device policy.

use std::collections::HashMap;
use std::time::Duration;

/// iButton reader: captures the token, reliable removal signal.
pub const AUTH_DEVICE_CORE_ONEWIRE: &str = "core.onewire";
/// Contactless reader: tokens come and go as they are waved past.
pub const AUTH_DEVICE_CORE_RFID: &str = "core.rfid";

/// How tokens from one auth device drive flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDevicePolicy {
    /// A captive device ends the user's flow once the token is gone.
    pub captive: bool,
    /// Max idle time of flows started by this device.
    pub max_idle: Duration,
    /// Window during which a removed token may be re-presented.
    pub grace: Duration,
}

impl Default for AuthDevicePolicy {
    fn default() -> Self {
        Self {
            captive: true,
            max_idle: Duration::from_secs(10),
            grace: Duration::ZERO,
        }
    }
}

/// Policies keyed by auth device name, with a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicyTable {
    policies: HashMap<String, AuthDevicePolicy>,
    fallback: AuthDevicePolicy,
}

impl AuthPolicyTable {
    pub fn new(fallback: AuthDevicePolicy) -> Self {
        Self {
            policies: HashMap::new(),
            fallback,
        }
    }

    pub fn insert(&mut self, auth_device: impl Into<String>, policy: AuthDevicePolicy) {
        self.policies.insert(auth_device.into(), policy);
    }

    pub fn set_fallback(&mut self, policy: AuthDevicePolicy) {
        self.fallback = policy;
    }

    pub fn policy_for(&self, auth_device: &str) -> &AuthDevicePolicy {
        self.policies.get(auth_device).unwrap_or(&self.fallback)
    }
}

impl Default for AuthPolicyTable {
    fn default() -> Self {
        let mut table = Self::new(AuthDevicePolicy::default());
        table.insert(
            AUTH_DEVICE_CORE_ONEWIRE,
            AuthDevicePolicy {
                captive: true,
                max_idle: Duration::from_secs(120),
                grace: Duration::ZERO,
            },
        );
        table.insert(
            AUTH_DEVICE_CORE_RFID,
            AuthDevicePolicy {
                captive: false,
                max_idle: Duration::from_secs(20),
                grace: Duration::from_secs(10),
            },
        );
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policies() {
        let table = AuthPolicyTable::default();
        assert!(table.policy_for(AUTH_DEVICE_CORE_ONEWIRE).captive);
        assert!(!table.policy_for(AUTH_DEVICE_CORE_RFID).captive);
        assert_eq!(
            table.policy_for("contrib.unknown").max_idle,
            Duration::from_secs(10)
        );
        assert_eq!(table.policy_for("contrib.unknown").grace, Duration::ZERO);
    }
}
