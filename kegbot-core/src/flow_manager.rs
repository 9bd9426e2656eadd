//! FlowManager: owns every active flow and drives its lifecycle.
//!
//! The FlowManager is responsible for:
//! - Turning meter readings into flows (implicit start on first activity)
//! - Explicit starts and stops from requests and authenticated users
//! - Idle detection and relay keep-alive on every heartbeat
//! - Publishing `flow_changed` / `flow_progress` / `relay_output` events
//! - Handing completed flow snapshots to the drink recorder
//!
//! All mutations of the flow map happen under one lock, and a meter reading
//! is applied to its tap's meter while that lock is held, so an idle timeout
//! and a fresh tick on the same tap are always serialized.

use crate::events::{CompletedFlowSender, EventPublisher};
use crate::flow::Flow;
use crate::tap::{Tap, TapError, TapManager};
use compact_str::CompactString;
use kanau::processor::Processor;
use kegbot_sdk::objects::{
    FlowAction, FlowRequest, FlowState, FlowStateChange, FlowUpdate, HeartbeatTick, MeterUpdate,
    OutboundEvent, RelayMode, SetRelayOutput,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info};

type FlowMap = HashMap<CompactString, Flow>;

pub struct FlowManager {
    taps: Arc<TapManager>,
    flows: Mutex<FlowMap>,
    next_flow_id: AtomicU64,
    default_max_idle: Duration,
    publisher: EventPublisher,
    completed_tx: CompletedFlowSender,
}

impl FlowManager {
    /// Create a new FlowManager.
    ///
    /// Flow ids are sequence numbers seeded from the current unix time, so
    /// they keep increasing across restarts.
    pub fn new(
        taps: Arc<TapManager>,
        publisher: EventPublisher,
        completed_tx: CompletedFlowSender,
        default_max_idle: Duration,
    ) -> Self {
        let seed = u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0);
        Self {
            taps,
            flows: Mutex::new(HashMap::new()),
            next_flow_id: AtomicU64::new(seed),
            default_max_idle,
            publisher,
            completed_tx,
        }
    }

    pub fn taps(&self) -> &Arc<TapManager> {
        &self.taps
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn default_max_idle(&self) -> Duration {
        self.default_max_idle
    }

    pub fn get_flow(&self, tap_name: &str) -> Option<FlowUpdate> {
        self.flows.lock().get(tap_name).map(Flow::update_event)
    }

    /// Snapshots of all active flows, ordered by tap name.
    pub fn active_flows(&self) -> Vec<FlowUpdate> {
        let mut flows: Vec<_> = self.flows.lock().values().map(Flow::update_event).collect();
        flows.sort_by(|a, b| a.tap_name.cmp(&b.tap_name));
        flows
    }

    /// Start a flow on `tap_name` unless one is already active there, in
    /// which case the existing flow is returned unchanged.
    pub fn start_flow(
        &self,
        tap_name: &str,
        username: Option<&str>,
        max_idle: Option<Duration>,
        now: OffsetDateTime,
    ) -> Result<FlowUpdate, TapError> {
        let mut flows = self.flows.lock();
        let tap = self.taps.get_tap(tap_name)?;
        match flows.entry(CompactString::from(tap_name)) {
            Entry::Occupied(existing) => {
                debug!(flow = %existing.get(), "Flow already active");
                Ok(existing.get().update_event())
            }
            Entry::Vacant(slot) => {
                let flow = self.open_flow(tap, username.map(CompactString::from), max_idle, now);
                Ok(slot.insert(flow).update_event())
            }
        }
    }

    /// The active flow on `tap_name`, starting an anonymous one if there is
    /// none. The flag tells whether a flow was started.
    pub fn get_or_start_flow(
        &self,
        tap_name: &str,
        now: OffsetDateTime,
    ) -> Result<(FlowUpdate, bool), TapError> {
        let mut flows = self.flows.lock();
        let tap = self.taps.get_tap(tap_name)?;
        let (flow, started) = self.get_or_start_locked(&mut flows, &tap, now);
        Ok((flow.update_event(), started))
    }

    fn get_or_start_locked<'a>(
        &self,
        flows: &'a mut FlowMap,
        tap: &Arc<Tap>,
        now: OffsetDateTime,
    ) -> (&'a mut Flow, bool) {
        match flows.entry(CompactString::from(tap.name())) {
            Entry::Occupied(existing) => (existing.into_mut(), false),
            Entry::Vacant(slot) => {
                debug!(tap = %tap.name(), "Starting flow implicitly due to activity");
                let flow = self.open_flow(Arc::clone(tap), None, None, now);
                (slot.insert(flow), true)
            }
        }
    }

    /// Apply a raw meter reading to `tap_name`.
    ///
    /// Returns the updated flow snapshot, or `None` if the reading credited
    /// no ticks (in which case nothing is started or published).
    pub fn update_flow(
        &self,
        tap_name: &str,
        reading: i64,
        now: OffsetDateTime,
    ) -> Result<Option<FlowUpdate>, TapError> {
        let mut flows = self.flows.lock();
        let tap = self.taps.get_tap(tap_name)?;
        let delta = tap.update_reading(reading, Some(now))?;
        debug!(tap = %tap_name, reading, delta, "Flow update");
        if delta == 0 {
            return Ok(None);
        }

        let (flow, _) = self.get_or_start_locked(&mut flows, &tap, now);
        flow.add_ticks(delta, now);

        let previous = flow.state();
        if previous == FlowState::Active {
            let update = flow.update_event();
            self.publisher
                .publish(OutboundEvent::FlowProgress(update.clone()));
            Ok(Some(update))
        } else {
            flow.set_state(FlowState::Active);
            Ok(Some(self.publish_change(flow, Some(previous))))
        }
    }

    /// End the active flow on `tap_name`. No-op if there is none.
    pub fn end_flow(&self, tap_name: &str) -> Option<FlowUpdate> {
        let mut flows = self.flows.lock();
        match flows.remove(tap_name) {
            Some(flow) => Some(self.finish(flow, true)),
            None => {
                debug!(tap = %tap_name, "No active flow to end");
                None
            }
        }
    }

    /// End every active flow, e.g. at shutdown.
    pub fn end_all_flows(&self) -> Vec<FlowUpdate> {
        let mut flows = self.flows.lock();
        let mut names: Vec<_> = flows.keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| flows.remove(&name))
            .map(|flow| self.finish(flow, true))
            .collect()
    }

    /// Rebind the user on the active flow of `tap_name`.
    pub fn set_username(&self, tap_name: &str, username: Option<&str>) -> Option<FlowUpdate> {
        let mut flows = self.flows.lock();
        let flow = flows.get_mut(tap_name)?;
        flow.set_username(username.map(CompactString::from));
        let state = flow.state();
        Some(self.publish_change(flow, Some(state)))
    }

    /// Start or claim a flow on `tap_name` for an authenticated user.
    ///
    /// - anonymous active flow: the user takes it over
    /// - flow of the same user: its max idle is refreshed
    /// - flow of another user: it is ended and a new flow is started
    pub fn authorize_user(
        &self,
        tap_name: &str,
        username: &str,
        max_idle: Duration,
        now: OffsetDateTime,
    ) -> Result<FlowUpdate, TapError> {
        let mut flows = self.flows.lock();
        let tap = self.taps.get_tap(tap_name)?;

        let owner = flows
            .get(tap_name)
            .map(|flow| flow.username().map(CompactString::from));
        match owner {
            Some(None) => {
                if let Some(flow) = flows.get_mut(tap_name) {
                    info!(user = %username, flow = %flow, "User is taking over the existing flow");
                    flow.set_username(Some(username.into()));
                    flow.set_max_idle(max_idle);
                    let state = flow.state();
                    let update = self.publish_change(flow, Some(state));
                    self.publish_relay(flow, RelayMode::Enabled);
                    return Ok(update);
                }
            }
            Some(Some(current)) if current == username => {
                if let Some(flow) = flows.get_mut(tap_name) {
                    debug!(user = %username, flow = %flow, "Refreshing flow of same user");
                    flow.set_max_idle(max_idle);
                    let state = flow.state();
                    return Ok(self.publish_change(flow, Some(state)));
                }
            }
            Some(Some(current)) => {
                info!(user = %username, previous_user = %current, "User is replacing the existing flow");
                if let Some(previous) = flows.remove(tap_name) {
                    // The relay stays open for the new user's flow.
                    self.finish(previous, false);
                }
            }
            None => {}
        }

        let flow = self.open_flow(tap, Some(username.into()), Some(max_idle), now);
        let update = flow.update_event();
        flows.insert(CompactString::from(tap_name), flow);
        Ok(update)
    }

    /// End every flow idle beyond its max idle time, passing through the
    /// idle state first. Returns the completed snapshots.
    pub fn check_idle(&self, now: OffsetDateTime) -> Vec<FlowUpdate> {
        let mut flows = self.flows.lock();
        let mut idle: Vec<_> = flows
            .iter()
            .filter(|(_, flow)| flow.is_idle(now))
            .map(|(name, _)| name.clone())
            .collect();
        idle.sort();

        let mut ended = Vec::with_capacity(idle.len());
        for name in idle {
            let Some(mut flow) = flows.remove(&name) else {
                continue;
            };
            info!(flow = %flow, idle = %flow.idle_time(now), "Flow has become too idle, ending");
            let previous = flow.state();
            flow.set_state(FlowState::Idle);
            self.publish_change(&flow, Some(previous));
            ended.push(self.finish(flow, true));
        }
        ended
    }

    /// Re-enable the relay of every authenticated flow.
    pub fn refresh_relays(&self) {
        let flows = self.flows.lock();
        for flow in flows.values().filter(|flow| flow.username().is_some()) {
            self.publish_relay(flow, RelayMode::Enabled);
        }
    }

    /// End the flow on a tap (if any) and unregister the tap.
    pub fn retire_tap(&self, tap_name: &str) -> Result<Option<FlowUpdate>, TapError> {
        let mut flows = self.flows.lock();
        let ended = flows
            .remove(tap_name)
            .map(|flow| self.finish(flow, true));
        self.taps.unregister_tap(tap_name)?;
        Ok(ended)
    }

    // -- Private helpers ----------------------------------------------------

    fn open_flow(
        &self,
        tap: Arc<Tap>,
        username: Option<CompactString>,
        max_idle: Option<Duration>,
        now: OffsetDateTime,
    ) -> Flow {
        let flow_id = self.next_flow_id.fetch_add(1, Ordering::Relaxed);
        let flow = Flow::new(
            tap,
            flow_id,
            username,
            max_idle.unwrap_or(self.default_max_idle),
            now,
        );
        info!(flow = %flow, "Starting flow");
        self.publish_change(&flow, None);
        if flow.username().is_some() {
            self.publish_relay(&flow, RelayMode::Enabled);
        }
        flow
    }

    fn finish(&self, mut flow: Flow, disable_relay: bool) -> FlowUpdate {
        info!(flow = %flow, "Stopping flow");
        if disable_relay {
            self.publish_relay(&flow, RelayMode::Disabled);
        }
        let previous = flow.state();
        flow.set_state(FlowState::Completed);
        let update = self.publish_change(&flow, Some(previous));
        if self.completed_tx.send(update.clone()).is_err() {
            error!(
                flow_id = update.flow_id,
                tap = %update.tap_name,
                ticks = update.ticks,
                "Completed flow channel closed, pour will not be recorded"
            );
        }
        update
    }

    fn publish_change(&self, flow: &Flow, previous: Option<FlowState>) -> FlowUpdate {
        let update = flow.update_event();
        self.publisher
            .publish(OutboundEvent::FlowChanged(FlowStateChange {
                previous,
                update: update.clone(),
            }));
        update
    }

    fn publish_relay(&self, flow: &Flow, mode: RelayMode) {
        let Some(relay) = flow.tap().relay_name() else {
            return;
        };
        debug!(flow_id = flow.flow_id(), relay = %relay, ?mode, "Publishing relay event");
        self.publisher
            .publish(OutboundEvent::RelayOutput(SetRelayOutput {
                output_name: relay.to_string(),
                mode,
            }));
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementations
// ---------------------------------------------------------------------------

impl Processor<MeterUpdate> for FlowManager {
    type Output = Option<FlowUpdate>;
    type Error = TapError;

    async fn process(&self, event: MeterUpdate) -> Result<Option<FlowUpdate>, TapError> {
        self.update_flow(&event.tap_name, event.reading, OffsetDateTime::now_utc())
    }
}

impl Processor<HeartbeatTick> for FlowManager {
    type Output = Vec<FlowUpdate>;
    type Error = Infallible;

    async fn process(&self, event: HeartbeatTick) -> Result<Vec<FlowUpdate>, Infallible> {
        let ended = self.check_idle(event.at);
        self.refresh_relays();
        Ok(ended)
    }
}

impl Processor<FlowRequest> for FlowManager {
    type Output = Option<FlowUpdate>;
    type Error = TapError;

    async fn process(&self, event: FlowRequest) -> Result<Option<FlowUpdate>, TapError> {
        match event.action {
            FlowAction::Start => self
                .start_flow(&event.tap_name, None, None, OffsetDateTime::now_utc())
                .map(Some),
            FlowAction::Stop => Ok(self.end_flow(&event.tap_name)),
        }
    }
}
