//! Heartbeat processor: emits a `HeartbeatTick` at a fixed interval.

use crate::events::{InboundEvent, InboundEventSender};
use kegbot_sdk::objects::HeartbeatTick;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub struct Heartbeat {
    interval: Duration,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, event_tx: InboundEventSender) {
        info!(interval = ?self.interval, "Heartbeat started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    // A missed tick is harmless; the next one covers it.
                    match event_tx.try_send(InboundEvent::Heartbeat(HeartbeatTick::now())) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => debug!("Inbound queue full, skipping heartbeat"),
                        Err(TrySendError::Closed(_)) => {
                            info!("Inbound event channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("Heartbeat shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::inbound_event_channel;

    #[tokio::test(start_paused = true)]
    async fn test_emits_ticks_until_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = inbound_event_channel();
        let handle = tokio::spawn(Heartbeat::new(Duration::from_secs(1)).run(shutdown_rx, event_tx));

        for _ in 0..3 {
            assert!(matches!(
                event_rx.recv().await,
                Some(InboundEvent::Heartbeat(_))
            ));
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
