//! Odometer-style tick accounting for a single flow meter.
//!
//! Devices report a cumulative pulse count that only ever grows, except when
//! the hardware counter wraps. [`FlowMeter`] turns that stream of raw readings
//! into a monotonic running total, attributing nothing to the very first
//! reading and discarding deltas above a configured noise ceiling.

use compact_str::CompactString;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Counter widths tried, in increasing order, when a reading goes backwards.
///
/// A counter whose real width is not listed here gets a wrong delta; the
/// noise ceiling is what keeps such a delta from being credited.
const OVERFLOW_BOUNDARIES: [u128; 3] = [1u128 << 16, 1u128 << 32, 1u128 << 64];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeterError {
    #[error("meter readings must be non-negative, got {0}")]
    NegativeReading(i64),
}

/// Accumulates ticks from raw odometer readings.
#[derive(Debug, Clone)]
pub struct FlowMeter {
    name: CompactString,
    /// Deltas above this are treated as noise; 0 disables the check.
    max_delta: u64,
    last_reading: Option<u64>,
    total_ticks: u64,
    last_activity: OffsetDateTime,
}

impl FlowMeter {
    pub fn new(name: impl Into<CompactString>, max_delta: u64) -> Self {
        Self {
            name: name.into(),
            max_delta,
            last_reading: None,
            total_ticks: 0,
            last_activity: OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// Report the instantaneous odometer reading of the meter.
    ///
    /// Returns the number of ticks credited by this reading. The first
    /// reading only records the odometer and credits nothing. A rejected
    /// reading (noise) credits nothing but still becomes the reference for
    /// the next delta. `when` defaults to now and is recorded as the last
    /// activity time if ticks were credited.
    pub fn set_ticks(&mut self, raw: i64, when: Option<OffsetDateTime>) -> Result<u64, MeterError> {
        let reading = u64::try_from(raw).map_err(|_| MeterError::NegativeReading(raw))?;

        let Some(last) = self.last_reading.replace(reading) else {
            debug!(meter = %self.name, reading, "First reading, odometer initialized");
            return Ok(0);
        };

        let delta = if reading >= last {
            reading - last
        } else {
            let delta = overflow_delta(last, reading);
            warn!(
                meter = %self.name,
                reading,
                last_reading = last,
                delta,
                "Reading below previous, assuming counter overflow"
            );
            delta
        };

        if self.max_delta > 0 && delta > self.max_delta {
            warn!(
                meter = %self.name,
                delta,
                max_delta = self.max_delta,
                "Delta greater than maximum, dropping reading"
            );
            return Ok(0);
        }

        if delta > 0 {
            self.total_ticks = self.total_ticks.saturating_add(delta);
            self.last_activity = when.unwrap_or_else(OffsetDateTime::now_utc);
        }
        Ok(delta)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_delta(&self) -> u64 {
        self.max_delta
    }

    /// Ticks credited since the meter was created.
    pub fn ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn last_reading(&self) -> Option<u64> {
        self.last_reading
    }

    pub fn last_activity(&self) -> OffsetDateTime {
        self.last_activity
    }

    pub fn idle_time(&self, now: OffsetDateTime) -> time::Duration {
        now - self.last_activity
    }
}

impl std::fmt::Display for FlowMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<FlowMeter {} ticks={}>", self.name, self.total_ticks)
    }
}

/// Delta for a `reading` below `last`, assuming the counter wrapped at the
/// first boundary of [`OVERFLOW_BOUNDARIES`] strictly greater than `last`.
pub fn overflow_delta(last: u64, reading: u64) -> u64 {
    let last = u128::from(last);
    let boundary = OVERFLOW_BOUNDARIES
        .iter()
        .copied()
        .find(|boundary| *boundary > last)
        .unwrap_or(1u128 << 64);
    let delta = boundary - last + u128::from(reading);
    u64::try_from(delta).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_DELTA: u64 = 5000;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    fn feed(meter: &mut FlowMeter, readings: &[i64]) {
        for reading in readings {
            meter.set_ticks(*reading, None).unwrap();
        }
    }

    #[test]
    fn test_basic_meter_use() {
        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        assert_eq!(meter.ticks(), 0);
        assert_eq!(meter.last_reading(), None);

        // First reading only initializes the odometer.
        assert_eq!(meter.set_ticks(2000, None).unwrap(), 0);
        assert_eq!(meter.ticks(), 0);

        assert_eq!(meter.set_ticks(2100, None).unwrap(), 100);
        assert_eq!(meter.ticks(), 100);
        assert_eq!(meter.last_reading(), Some(2100));
    }

    #[test]
    fn test_noise_rejection_updates_reference() {
        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        feed(&mut meter, &[2000, 2100]);

        let rejected = 2100 + MAX_DELTA as i64 + 1;
        assert_eq!(meter.set_ticks(rejected, None).unwrap(), 0);
        assert_eq!(meter.ticks(), 100);
        assert_eq!(meter.last_reading(), Some(rejected as u64));

        // Next delta is relative to the rejected reading.
        assert_eq!(meter.set_ticks(rejected + 40, None).unwrap(), 40);
        assert_eq!(meter.ticks(), 140);
    }

    #[test]
    fn test_sum_of_consecutive_differences() {
        let readings = [1000, 1100, 2100, 3100, 3100, 3101, 7000, 7000];
        let mut meter = FlowMeter::new("test_meter", 0);
        feed(&mut meter, &readings);
        let expected: i64 = readings.windows(2).map(|w| w[1] - w[0]).sum();
        assert_eq!(meter.ticks(), expected as u64);

        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        feed(&mut meter, &[1000, 1100, 2100, 3100]);
        assert_eq!(meter.ticks(), 2100);
    }

    #[test]
    fn test_overflow_handling() {
        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        meter.set_ticks((1i64 << 32) - 100, None).unwrap();
        assert_eq!(meter.ticks(), 0);

        meter.set_ticks((1i64 << 32) - 50, None).unwrap();
        assert_eq!(meter.ticks(), 50);

        assert_eq!(meter.set_ticks(10, None).unwrap(), 60);
        assert_eq!(meter.ticks(), 110);
    }

    #[test]
    fn test_small_counter_wrap_is_noise() {
        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        feed(&mut meter, &[0, 100]);
        assert_eq!(meter.ticks(), 100);

        // 100 -> 10 implies a wrap at 2^16, far above the noise ceiling.
        assert_eq!(meter.set_ticks(10, None).unwrap(), 0);
        assert_eq!(meter.ticks(), 100);

        assert_eq!(meter.set_ticks(20, None).unwrap(), 10);
        assert_eq!(meter.ticks(), 110);
    }

    #[test]
    fn test_overflow_boundary_selection() {
        assert_eq!(overflow_delta(u64::from(u16::MAX), 0), 1);
        assert_eq!(overflow_delta(1 << 16, 0), (1 << 32) - (1 << 16));
        assert_eq!(overflow_delta(u64::from(u32::MAX), 5), 6);
        assert_eq!(overflow_delta(1 << 32, 5), u64::MAX - (1 << 32) + 6);
        assert_eq!(overflow_delta(u64::MAX, 0), 1);
    }

    #[test]
    fn test_wrap_just_below_32_bit_boundary() {
        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        meter.set_ticks(i64::from(u32::MAX), None).unwrap();
        assert_eq!(meter.set_ticks(5, None).unwrap(), 6);
        assert_eq!(meter.ticks(), 6);
    }

    #[test]
    fn test_negative_reading_rejected() {
        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        meter.set_ticks(100, None).unwrap();
        assert_eq!(
            meter.set_ticks(-1, None),
            Err(MeterError::NegativeReading(-1))
        );
        assert_eq!(meter.last_reading(), Some(100));
        assert_eq!(meter.set_ticks(150, None).unwrap(), 50);
    }

    #[test]
    fn test_activity_monitoring() {
        let mut meter = FlowMeter::new("test_meter", MAX_DELTA);
        meter.set_ticks(0, Some(at(0))).unwrap();

        // No activity yet: idle since the epoch.
        assert_eq!(meter.idle_time(at(1000)), time::Duration::seconds(1000));

        meter.set_ticks(10, Some(at(1000))).unwrap();
        meter.set_ticks(30, Some(at(1015))).unwrap();
        assert_eq!(meter.idle_time(at(1020)), time::Duration::seconds(5));

        // Zero delta leaves the activity time alone.
        meter.set_ticks(30, Some(at(1030))).unwrap();
        assert_eq!(meter.idle_time(at(1040)), time::Duration::seconds(25));

        // So do rejected and backwards readings.
        meter.set_ticks(9000, Some(at(1050))).unwrap();
        assert_eq!(meter.idle_time(at(1060)), time::Duration::seconds(45));
        meter.set_ticks(8000, Some(at(1070))).unwrap();
        assert_eq!(meter.idle_time(at(1080)), time::Duration::seconds(65));
    }
}
