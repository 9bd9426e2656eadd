//! Tap registry.
//!
//! A [`Tap`] is a logical pour path with its own [`FlowMeter`]. The
//! [`TapManager`] owns every registered tap; the rest of the core only ever
//! sees `Arc<Tap>` handles obtained through it.

use crate::meter::{FlowMeter, MeterError};
use compact_str::CompactString;
use kegbot_sdk::config::TapConfig;
use kegbot_sdk::objects::TapInfo;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Error)]
pub enum TapError {
    #[error("tap already registered: {0}")]
    AlreadyRegistered(CompactString),

    #[error("unknown tap: {0}")]
    UnknownTap(CompactString),

    #[error(transparent)]
    Meter(#[from] MeterError),
}

#[derive(Debug)]
pub struct Tap {
    name: CompactString,
    ml_per_tick: f64,
    relay_name: Option<CompactString>,
    meter: Mutex<FlowMeter>,
}

impl Tap {
    pub fn new(
        name: impl Into<CompactString>,
        ml_per_tick: f64,
        max_tick_delta: u64,
        relay_name: Option<CompactString>,
    ) -> Self {
        let name = name.into();
        Self {
            meter: Mutex::new(FlowMeter::new(name.clone(), max_tick_delta)),
            name,
            ml_per_tick,
            relay_name,
        }
    }

    pub fn from_config(config: &TapConfig) -> Self {
        Self::new(
            config.name.as_str(),
            config.ml_per_tick,
            config.max_tick_delta,
            config.relay_name.as_deref().map(CompactString::from),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ml_per_tick(&self) -> f64 {
        self.ml_per_tick
    }

    pub fn relay_name(&self) -> Option<&str> {
        self.relay_name.as_deref()
    }

    pub fn ticks_to_milliliters(&self, ticks: u64) -> f64 {
        ticks as f64 * self.ml_per_tick
    }

    /// Forward a raw odometer reading to this tap's meter.
    pub fn update_reading(
        &self,
        raw: i64,
        when: Option<OffsetDateTime>,
    ) -> Result<u64, MeterError> {
        self.meter.lock().set_ticks(raw, when)
    }

    /// Snapshot of the meter state.
    pub fn meter(&self) -> FlowMeter {
        self.meter.lock().clone()
    }

    pub fn info(&self) -> TapInfo {
        TapInfo {
            name: self.name.to_string(),
            meter_name: self.name.to_string(),
            ml_per_tick: self.ml_per_tick,
            relay_name: self.relay_name.as_ref().map(|r| r.to_string()),
        }
    }

    /// Whether this tap was built from an equivalent configuration.
    pub fn matches_config(&self, config: &TapConfig) -> bool {
        self.name == config.name
            && self.ml_per_tick == config.ml_per_tick
            && self.meter.lock().max_delta() == config.max_tick_delta
            && self.relay_name.as_deref() == config.relay_name.as_deref()
    }
}

impl std::fmt::Display for Tap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (ml_per_tick={})", self.name, self.ml_per_tick)
    }
}

/// Registry of taps keyed by name.
#[derive(Debug, Default)]
pub struct TapManager {
    taps: RwLock<HashMap<CompactString, Arc<Tap>>>,
}

impl TapManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tap(&self, tap: Tap) -> Result<Arc<Tap>, TapError> {
        let mut taps = self.taps.write();
        if taps.contains_key(tap.name()) {
            return Err(TapError::AlreadyRegistered(tap.name.clone()));
        }
        info!(tap = %tap, "Registering tap");
        let tap = Arc::new(tap);
        taps.insert(tap.name.clone(), Arc::clone(&tap));
        Ok(tap)
    }

    pub fn unregister_tap(&self, name: &str) -> Result<Arc<Tap>, TapError> {
        let removed = self
            .taps
            .write()
            .remove(name)
            .ok_or_else(|| TapError::UnknownTap(name.into()))?;
        info!(tap = %name, "Unregistered tap");
        Ok(removed)
    }

    pub fn get_tap(&self, name: &str) -> Result<Arc<Tap>, TapError> {
        self.taps
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TapError::UnknownTap(name.into()))
    }

    pub fn tap_exists(&self, name: &str) -> bool {
        self.taps.read().contains_key(name)
    }

    /// All registered taps, ordered by name.
    pub fn all_taps(&self) -> Vec<Arc<Tap>> {
        let mut taps: Vec<_> = self.taps.read().values().cloned().collect();
        taps.sort_by(|a, b| a.name.cmp(&b.name));
        taps
    }

    pub fn len(&self) -> usize {
        self.taps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.read().is_empty()
    }

    pub fn update_device_reading(
        &self,
        name: &str,
        raw: i64,
        when: Option<OffsetDateTime>,
    ) -> Result<u64, TapError> {
        let tap = self.get_tap(name)?;
        Ok(tap.update_reading(raw, when)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let manager = TapManager::new();
        manager.register_tap(Tap::new("a", 1.0, 0, None)).unwrap();

        assert!(matches!(
            manager.register_tap(Tap::new("a", 1.0, 0, None)),
            Err(TapError::AlreadyRegistered(name)) if name == "a"
        ));
        assert!(matches!(
            manager.get_tap("b"),
            Err(TapError::UnknownTap(name)) if name == "b"
        ));
        assert!(manager.tap_exists("a"));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let manager = TapManager::new();
        manager.register_tap(Tap::new("a", 1.0, 0, None)).unwrap();
        manager.unregister_tap("a").unwrap();
        assert!(!manager.tap_exists("a"));
        assert!(matches!(
            manager.unregister_tap("a"),
            Err(TapError::UnknownTap(_))
        ));

        // The name is free again, with a fresh meter.
        manager.register_tap(Tap::new("a", 1.0, 0, None)).unwrap();
        assert_eq!(manager.get_tap("a").unwrap().meter().last_reading(), None);
    }

    #[test]
    fn test_update_device_reading() {
        let manager = TapManager::new();
        manager
            .register_tap(Tap::new("kegboard.flow0", 0.5, 0, None))
            .unwrap();

        assert_eq!(
            manager
                .update_device_reading("kegboard.flow0", 1000, None)
                .unwrap(),
            0
        );
        assert_eq!(
            manager
                .update_device_reading("kegboard.flow0", 1100, None)
                .unwrap(),
            100
        );

        let tap = manager.get_tap("kegboard.flow0").unwrap();
        assert_eq!(tap.meter().ticks(), 100);
        assert_eq!(tap.ticks_to_milliliters(100), 50.0);

        assert!(matches!(
            manager.update_device_reading("kegboard.flow0", -5, None),
            Err(TapError::Meter(MeterError::NegativeReading(-5)))
        ));
        assert!(matches!(
            manager.update_device_reading("missing", 5, None),
            Err(TapError::UnknownTap(_))
        ));
    }

    #[test]
    fn test_config_matching() {
        let config = TapConfig::new("a", 0.5).with_relay("relay0");
        let tap = Tap::from_config(&config);
        assert_eq!(tap.relay_name(), Some("relay0"));
        assert!(tap.matches_config(&config));
        assert!(!tap.matches_config(&config.clone().with_max_tick_delta(7)));
        assert!(!tap.matches_config(&TapConfig::new("a", 0.25)));
    }

    #[test]
    fn test_all_taps_sorted() {
        let manager = TapManager::new();
        for name in ["c", "a", "b"] {
            manager.register_tap(Tap::new(name, 1.0, 0, None)).unwrap();
        }
        let names: Vec<_> = manager
            .all_taps()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
