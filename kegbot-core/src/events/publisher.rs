//! Fan-out of outbound events to subscribers.
//!
//! Publishing never blocks the accounting path: each subscriber has its own
//! bounded queue, and an event that does not fit is logged and dropped for
//! that subscriber only.

use super::channels::OutboundEventReceiver;
use kegbot_sdk::objects::OutboundEvent;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EventPublisher {
    subscribers: Arc<RwLock<Vec<mpsc::Sender<OutboundEvent>>>>,
    capacity: usize,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber with its own queue.
    pub fn subscribe(&self) -> OutboundEventReceiver {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn publish(&self, event: OutboundEvent) {
        let mut saw_closed = false;
        {
            let subscribers = self.subscribers.read();
            for subscriber in subscribers.iter() {
                match subscriber.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) => {
                        warn!(
                            kind = dropped.kind(),
                            "Subscriber queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => saw_closed = true,
                }
            }
        }

        if saw_closed {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|s| !s.is_closed());
            debug!(remaining = subscribers.len(), "Pruned closed subscribers");
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(super::DEFAULT_CHANNEL_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kegbot_sdk::objects::{RelayMode, SetRelayOutput};

    fn relay_event(mode: RelayMode) -> OutboundEvent {
        OutboundEvent::RelayOutput(SetRelayOutput {
            output_name: "relay0".to_string(),
            mode,
        })
    }

    #[test]
    fn test_every_subscriber_receives() {
        let publisher = EventPublisher::new(4);
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();

        publisher.publish(relay_event(RelayMode::Enabled));

        assert_eq!(a.try_recv().unwrap(), relay_event(RelayMode::Enabled));
        assert_eq!(b.try_recv().unwrap(), relay_event(RelayMode::Enabled));
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let publisher = EventPublisher::new(1);
        let mut slow = publisher.subscribe();

        publisher.publish(relay_event(RelayMode::Enabled));
        publisher.publish(relay_event(RelayMode::Disabled));

        assert_eq!(slow.try_recv().unwrap(), relay_event(RelayMode::Enabled));
        assert!(slow.try_recv().is_err());
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_closed_subscriber_pruned() {
        let publisher = EventPublisher::new(4);
        let gone = publisher.subscribe();
        let mut kept = publisher.subscribe();
        drop(gone);

        publisher.publish(relay_event(RelayMode::Enabled));

        assert_eq!(publisher.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
