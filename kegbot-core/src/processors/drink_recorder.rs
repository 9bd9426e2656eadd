//! DrinkRecorder processor.
//!
//! The DrinkRecorder is responsible for:
//! - Receiving completed flow snapshots from the flow manager
//! - Skipping pours at or below the minimum volume
//! - Recording the rest with the backend and publishing `drink_created`
//! - Retrying failed recordings with exponential backoff (2^0 to 2^11 seconds)
//!
//! A completed pour is never discarded because the backend is unavailable.
//! Whatever is still pending at shutdown is logged as JSON so it can be
//! replayed by hand.

use crate::backend::{Backend, BackendError};
use crate::events::{CompletedFlowReceiver, EventPublisher};
use kanau::processor::Processor;
use kegbot_sdk::objects::{DrinkCreated, FlowUpdate, OutboundEvent, RecordDrinkRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Maximum backoff exponent (2^11 = 2048 seconds).
const MAX_RETRY_COUNT: u32 = 11;

/// How often the retry queue is checked for due pours.
const RETRY_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for the last completed flows after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct PendingDrink {
    request: RecordDrinkRequest,
    failures: u32,
    next_attempt: Instant,
}

pub struct DrinkRecorder {
    backend: Arc<dyn Backend>,
    publisher: EventPublisher,
    min_volume_ml: f64,
    pending: Mutex<VecDeque<PendingDrink>>,
}

impl DrinkRecorder {
    pub fn new(backend: Arc<dyn Backend>, publisher: EventPublisher, min_volume_ml: f64) -> Self {
        Self {
            backend,
            publisher,
            min_volume_ml,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run until shutdown, then drain the remaining completed flows.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut completed_rx: CompletedFlowReceiver) {
        info!(backend = self.backend.name(), "DrinkRecorder started");

        let mut retry_interval = tokio::time::interval(RETRY_CHECK_INTERVAL);
        retry_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        info!("DrinkRecorder received shutdown signal");
                        break;
                    }
                }

                maybe_flow = completed_rx.recv() => {
                    let Some(flow) = maybe_flow else {
                        info!("Completed flow channel closed");
                        break;
                    };
                    if let Err(e) = self.process(flow).await {
                        warn!(error = %e, "Drink not recorded, queued for retry");
                    }
                }

                _ = retry_interval.tick() => {
                    self.retry_pending(Instant::now()).await;
                }
            }
        }

        // Flows ended during shutdown arrive after the signal.
        while let Ok(Some(flow)) = tokio::time::timeout(DRAIN_TIMEOUT, completed_rx.recv()).await {
            if let Err(e) = self.process(flow).await {
                warn!(error = %e, "Drink not recorded during shutdown");
            }
        }

        self.final_retry().await;
        info!("DrinkRecorder shutdown complete");
    }

    /// Record every pending pour whose backoff has elapsed.
    pub async fn retry_pending(&self, now: Instant) {
        let due: Vec<PendingDrink> = {
            let mut pending = self.pending.lock();
            let (due, waiting): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| p.next_attempt <= now);
            pending.extend(waiting);
            due
        };

        for mut drink in due {
            match self.record(&drink.request).await {
                Ok(created) => {
                    info!(
                        flow_id = created.flow_id,
                        drink_id = created.drink_id,
                        failures = drink.failures,
                        "Drink recorded after retry"
                    );
                }
                Err(e) => {
                    drink.failures += 1;
                    drink.next_attempt = now + calculate_retry_delay(drink.failures - 1);
                    warn!(
                        flow_id = drink.request.flow_id,
                        error = %e,
                        failures = drink.failures,
                        "Drink retry failed"
                    );
                    self.pending.lock().push_back(drink);
                }
            }
        }
    }

    async fn record(&self, request: &RecordDrinkRequest) -> Result<DrinkCreated, BackendError> {
        let record = self.backend.record_drink(request).await?;
        let created = DrinkCreated::new(request, &record);
        info!(
            flow_id = created.flow_id,
            drink_id = created.drink_id,
            tap = %created.tap_name,
            ticks = request.ticks,
            volume_ml = request.volume_ml,
            "Drink recorded"
        );
        self.publisher
            .publish(OutboundEvent::DrinkCreated(created.clone()));
        Ok(created)
    }

    /// One last attempt for every pending pour, ignoring backoff.
    async fn final_retry(&self) {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        for drink in pending {
            if let Err(e) = self.record(&drink.request).await {
                let json = serde_json::to_string(&drink.request)
                    .unwrap_or_else(|_| format!("{:?}", drink.request));
                error!(error = %e, pending = %json, "Unrecorded pour at shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<FlowUpdate> for DrinkRecorder {
    type Output = Option<DrinkCreated>;
    type Error = BackendError;

    async fn process(&self, flow: FlowUpdate) -> Result<Option<DrinkCreated>, BackendError> {
        if flow.volume_ml <= self.min_volume_ml {
            info!(
                flow_id = flow.flow_id,
                volume_ml = flow.volume_ml,
                min_volume_ml = self.min_volume_ml,
                "Not recording flow: volume below minimum"
            );
            return Ok(None);
        }

        let request = RecordDrinkRequest::from(&flow);
        debug!(flow_id = flow.flow_id, "Recording drink");
        match self.record(&request).await {
            Ok(created) => Ok(Some(created)),
            Err(e) => {
                self.pending.lock().push_back(PendingDrink {
                    request,
                    failures: 1,
                    next_attempt: Instant::now() + calculate_retry_delay(0),
                });
                Err(e)
            }
        }
    }
}

/// Calculate the next retry delay based on retry count.
///
/// Uses exponential backoff: 2^retry_count seconds.
pub fn calculate_retry_delay(retry_count: u32) -> Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_RETRY_COUNT));
    Duration::from_secs(seconds)
}
