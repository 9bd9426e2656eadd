//! Feeds fired alarms back into the inbound event channel.

use crate::alarm::AlarmManager;
use crate::events::{InboundEvent, InboundEventSender};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct AlarmDispatcher {
    alarms: Arc<AlarmManager<InboundEvent>>,
}

impl AlarmDispatcher {
    pub fn new(alarms: Arc<AlarmManager<InboundEvent>>) -> Self {
        Self { alarms }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, event_tx: InboundEventSender) {
        info!("AlarmDispatcher started");

        loop {
            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                Some(alarm) = self.alarms.wait_for_next_alarm(None) => {
                    debug!(alarm = %alarm.name, kind = alarm.payload.kind(), "Dispatching alarm");
                    if event_tx.send(alarm.payload).await.is_err() {
                        info!("Inbound event channel closed");
                        break;
                    }
                }
            }
        }

        info!(pending = self.alarms.len(), "AlarmDispatcher shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::inbound_event_channel;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_forwards_fired_alarms() {
        let alarms = Arc::new(AlarmManager::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = inbound_event_channel();
        let handle = tokio::spawn(AlarmDispatcher::new(Arc::clone(&alarms)).run(shutdown_rx, event_tx));

        let start = Instant::now();
        alarms.add_alarm(
            "token-expiry:a",
            start + Duration::from_secs(10),
            InboundEvent::TokenExpired {
                tap_name: "a".into(),
            },
        );

        let event = event_rx.recv().await.unwrap();
        assert_eq!(
            event,
            InboundEvent::TokenExpired {
                tap_name: "a".into()
            }
        );
        assert!(Instant::now() >= start + Duration::from_secs(10));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
