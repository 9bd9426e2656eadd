//! CoreService processor.
//!
//! The single consumer of [`InboundEvent`]s. Every meter reading, heartbeat,
//! token event and flow request passes through [`CoreService::dispatch`], so
//! the managers see them strictly in arrival order. The service also keeps
//! the registered taps in line with the tap configuration, and ends every
//! active flow on shutdown so those pours get recorded.

use crate::auth::AuthenticationManager;
use crate::config::{TapStore, TapWatcher};
use crate::events::{InboundEvent, InboundEventReceiver};
use crate::flow_manager::FlowManager;
use crate::tap::Tap;
use kanau::processor::Processor;
use kegbot_sdk::config::TapConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of reconciling registered taps against configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TapDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl TapDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

pub struct CoreService {
    flows: Arc<FlowManager>,
    auth: Arc<AuthenticationManager>,
}

impl CoreService {
    pub fn new(flows: Arc<FlowManager>, auth: Arc<AuthenticationManager>) -> Self {
        Self { flows, auth }
    }

    /// Run the CoreService until shutdown is signaled.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut event_rx: InboundEventReceiver,
        tap_store: TapStore,
        mut tap_watcher: TapWatcher,
    ) {
        let diff = self.reconcile_taps(&tap_store.current());
        info!(taps = diff.added.len(), "CoreService started");

        loop {
            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        info!("CoreService received shutdown signal");
                        break;
                    }
                }

                Ok(taps) = tap_watcher.changed() => {
                    let diff = self.reconcile_taps(&taps);
                    info!(
                        added = ?diff.added,
                        removed = ?diff.removed,
                        changed = ?diff.changed,
                        "Reconciled tap configuration"
                    );
                }

                Some(event) = event_rx.recv() => {
                    self.dispatch(event).await;
                }

                else => {
                    info!("Inbound event channel closed");
                    break;
                }
            }
        }

        // Readings queued before the signal still belong to real pours.
        let mut drained = 0usize;
        while let Ok(event) = event_rx.try_recv() {
            self.dispatch(event).await;
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "Applied queued events before shutdown");
        }

        let ended = self.flows.end_all_flows();
        info!(ended = ended.len(), "CoreService shutdown complete");
    }

    /// Route one inbound event to its manager.
    pub async fn dispatch(&self, event: InboundEvent) {
        debug!(kind = event.kind(), "Dispatching inbound event");
        match event {
            InboundEvent::Meter(update) => {
                let tap = update.tap_name.clone();
                if let Err(e) = self.flows.process(update).await {
                    warn!(tap = %tap, error = %e, "Meter update rejected");
                }
            }
            InboundEvent::Heartbeat(tick) => {
                let ended = self.flows.process(tick).await.unwrap_or_else(|e| match e {});
                if !ended.is_empty() {
                    debug!(ended = ended.len(), "Idle flows ended");
                }
            }
            InboundEvent::Token(token) => {
                self.auth.process(token).await.unwrap_or_else(|e| match e {});
            }
            InboundEvent::FlowRequest(request) => {
                let tap = request.tap_name.clone();
                if let Err(e) = self.flows.process(request).await {
                    warn!(tap = %tap, error = %e, "Flow request rejected");
                }
            }
            InboundEvent::TokenExpired { tap_name } => {
                self.auth.token_expired(&tap_name);
            }
        }
    }

    /// Register added taps, unregister removed ones and re-register changed
    /// ones. Flows on removed or changed taps are ended first.
    pub fn reconcile_taps(&self, configs: &[TapConfig]) -> TapDiff {
        let taps = self.flows.taps();
        let mut diff = TapDiff::default();

        for tap in taps.all_taps() {
            let changed = match configs.iter().find(|c| c.name == tap.name()) {
                Some(config) if tap.matches_config(config) => continue,
                Some(_) => true,
                None => false,
            };
            if let Err(e) = self.flows.retire_tap(tap.name()) {
                warn!(tap = %tap.name(), error = %e, "Failed to retire tap");
                continue;
            }
            if changed {
                diff.changed.push(tap.name().to_string());
            } else {
                diff.removed.push(tap.name().to_string());
            }
        }

        for config in configs {
            if taps.tap_exists(&config.name) {
                continue;
            }
            match taps.register_tap(Tap::from_config(config)) {
                Ok(_) if diff.changed.contains(&config.name) => {}
                Ok(_) => diff.added.push(config.name.clone()),
                Err(e) => warn!(tap = %config.name, error = %e, "Failed to register tap"),
            }
        }
        diff
    }
}
