//! Core accounting configuration.

use std::time::Duration;

/// Thresholds and sizing for the accounting core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Max idle time for flows not started by an auth device.
    pub idle_timeout: Duration,
    /// Completed flows at or below this volume are not recorded.
    pub min_volume_to_record_ml: f64,
    /// Interval between heartbeat ticks.
    pub heartbeat_interval: Duration,
    /// Capacity of each subscriber queue on the event publisher.
    pub event_buffer: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            min_volume_to_record_ml: 10.0,
            heartbeat_interval: Duration::from_secs(1),
            event_buffer: 256,
        }
    }
}
