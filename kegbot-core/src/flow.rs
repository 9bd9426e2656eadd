//! A single pour in progress.

use crate::tap::Tap;
use compact_str::CompactString;
use kegbot_sdk::objects::{FlowState, FlowUpdate};
use std::sync::Arc;
use time::OffsetDateTime;

/// One pour on one tap, from its first tick (or explicit start) until it is
/// ended. Owned by the flow manager; consumers only see [`FlowUpdate`]
/// snapshots.
#[derive(Debug, Clone)]
pub struct Flow {
    tap: Arc<Tap>,
    flow_id: u64,
    username: Option<CompactString>,
    max_idle: time::Duration,
    state: FlowState,
    start_time: OffsetDateTime,
    /// Time of the last credited tick; the start time until then.
    end_time: OffsetDateTime,
    ticks: u64,
}

impl Flow {
    pub fn new(
        tap: Arc<Tap>,
        flow_id: u64,
        username: Option<CompactString>,
        max_idle: std::time::Duration,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            tap,
            flow_id,
            username,
            max_idle: to_time_duration(max_idle),
            state: FlowState::Initial,
            start_time: now,
            end_time: now,
            ticks: 0,
        }
    }

    pub fn flow_id(&self) -> u64 {
        self.flow_id
    }

    pub fn tap(&self) -> &Arc<Tap> {
        &self.tap
    }

    pub fn tap_name(&self) -> &str {
        self.tap.name()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: Option<CompactString>) {
        self.username = username;
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn set_state(&mut self, state: FlowState) {
        self.state = state;
    }

    pub fn max_idle(&self) -> time::Duration {
        self.max_idle
    }

    pub fn set_max_idle(&mut self, max_idle: std::time::Duration) {
        self.max_idle = to_time_duration(max_idle);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn volume_ml(&self) -> f64 {
        self.tap.ticks_to_milliliters(self.ticks)
    }

    pub fn start_time(&self) -> OffsetDateTime {
        self.start_time
    }

    pub fn end_time(&self) -> OffsetDateTime {
        self.end_time
    }

    /// Credit ticks to this flow. Completed flows no longer accumulate.
    pub fn add_ticks(&mut self, amount: u64, when: OffsetDateTime) -> bool {
        if self.state == FlowState::Completed {
            return false;
        }
        self.ticks = self.ticks.saturating_add(amount);
        self.end_time = when;
        true
    }

    pub fn idle_time(&self, now: OffsetDateTime) -> time::Duration {
        now - self.end_time
    }

    pub fn is_idle(&self, now: OffsetDateTime) -> bool {
        self.idle_time(now) > self.max_idle
    }

    pub fn update_event(&self) -> FlowUpdate {
        FlowUpdate {
            flow_id: self.flow_id,
            tap_name: self.tap.name().to_string(),
            state: self.state,
            username: self.username.as_ref().map(|u| u.to_string()),
            start_time: self.start_time,
            last_activity_time: self.end_time,
            ticks: self.ticks,
            volume_ml: self.volume_ml(),
        }
    }
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Flow 0x{:08x}: tap={} ticks={} username={} max_idle={}>",
            self.flow_id,
            self.tap.name(),
            self.ticks,
            self.username.as_deref().unwrap_or("-"),
            self.max_idle
        )
    }
}

fn to_time_duration(d: std::time::Duration) -> time::Duration {
    time::Duration::try_from(d).unwrap_or(time::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    fn flow() -> Flow {
        let tap = Arc::new(Tap::new("kegboard.flow0", 0.5, 0, None));
        Flow::new(tap, 7, None, Duration::from_secs(10), at(100))
    }

    #[test]
    fn test_new_flow_is_initial() {
        let flow = flow();
        assert_eq!(flow.state(), FlowState::Initial);
        assert_eq!(flow.ticks(), 0);
        assert_eq!(flow.start_time(), flow.end_time());
    }

    #[test]
    fn test_idle_measured_from_last_tick() {
        let mut flow = flow();
        assert!(!flow.is_idle(at(110)));
        assert!(flow.is_idle(at(111)));

        flow.add_ticks(100, at(105));
        assert_eq!(flow.idle_time(at(111)), time::Duration::seconds(6));
        assert!(!flow.is_idle(at(115)));
        assert!(flow.is_idle(at(116)));

        flow.set_max_idle(Duration::from_secs(120));
        assert!(!flow.is_idle(at(200)));
    }

    #[test]
    fn test_completed_flow_does_not_grow() {
        let mut flow = flow();
        assert!(flow.add_ticks(10, at(101)));
        flow.set_state(FlowState::Completed);
        assert!(!flow.add_ticks(10, at(102)));
        assert_eq!(flow.ticks(), 10);
        assert_eq!(flow.end_time(), at(101));
    }

    #[test]
    fn test_update_event_snapshot() {
        let mut flow = flow();
        flow.add_ticks(100, at(101));
        flow.set_state(FlowState::Active);
        flow.set_username(Some("alice".into()));

        let update = flow.update_event();
        assert_eq!(update.flow_id, 7);
        assert_eq!(update.tap_name, "kegboard.flow0");
        assert_eq!(update.state, FlowState::Active);
        assert_eq!(update.username.as_deref(), Some("alice"));
        assert_eq!(update.ticks, 100);
        assert_eq!(update.volume_ml, 50.0);
        assert_eq!(update.start_time, at(100));
        assert_eq!(update.last_activity_time, at(101));
    }
}
