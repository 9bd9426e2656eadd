//! Tap configuration.

/// Largest volume accepted from a single meter report when no explicit
/// `max_tick_delta` is configured.
pub const DEFAULT_MAX_POUR_ML: f64 = 500.0;

/// One physical pour path.
#[derive(Debug, Clone, PartialEq)]
pub struct TapConfig {
    /// Name of the tap; device readings are addressed to it.
    pub name: String,
    pub ml_per_tick: f64,
    /// Largest delta accepted from one reading; 0 disables the check.
    pub max_tick_delta: u64,
    /// Relay (valve) opened for authenticated pours on this tap.
    pub relay_name: Option<String>,
}

impl TapConfig {
    /// Create a tap whose noise ceiling is [`DEFAULT_MAX_POUR_ML`].
    pub fn new(name: impl Into<String>, ml_per_tick: f64) -> Self {
        Self {
            name: name.into(),
            ml_per_tick,
            max_tick_delta: default_max_tick_delta(ml_per_tick),
            relay_name: None,
        }
    }

    pub fn with_max_tick_delta(mut self, max_tick_delta: u64) -> Self {
        self.max_tick_delta = max_tick_delta;
        self
    }

    pub fn with_relay(mut self, relay_name: impl Into<String>) -> Self {
        self.relay_name = Some(relay_name.into());
        self
    }
}

/// Ticks corresponding to [`DEFAULT_MAX_POUR_ML`] at the given resolution.
pub fn default_max_tick_delta(ml_per_tick: f64) -> u64 {
    if ml_per_tick <= 0.0 || !ml_per_tick.is_finite() {
        return 0;
    }
    (DEFAULT_MAX_POUR_ML / ml_per_tick) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_tick_delta() {
        assert_eq!(TapConfig::new("a", 0.5).max_tick_delta, 1000);
        assert_eq!(TapConfig::new("a", 1.0 / 2200.0).max_tick_delta, 1_100_000);
        assert_eq!(TapConfig::new("a", 0.0).max_tick_delta, 0);
    }
}
