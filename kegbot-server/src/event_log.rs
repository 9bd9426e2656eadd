//! Writes outbound events to the log as JSON.

use kegbot_core::events::OutboundEventReceiver;
use kegbot_sdk::objects::OutboundEvent;
use tracing::Level;

/// Level an event is logged at; routine progress is kept out of `info`.
pub fn level_for(event: &OutboundEvent) -> Level {
    match event {
        OutboundEvent::FlowProgress(_) => Level::DEBUG,
        _ => Level::INFO,
    }
}

/// Log every event until all publishers are gone.
pub async fn run(mut events: OutboundEventReceiver) {
    while let Some(event) = events.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(kind = event.kind(), error = %e, "Failed to serialize event");
                continue;
            }
        };
        if level_for(&event) == Level::DEBUG {
            tracing::debug!(kind = event.kind(), event = %json, "Event");
        } else {
            tracing::info!(kind = event.kind(), event = %json, "Event");
        }
    }
    tracing::debug!("Event logger stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use kegbot_core::events::EventPublisher;
    use kegbot_sdk::objects::{RelayMode, SetRelayOutput};

    #[test]
    fn test_relay_logged_at_info() {
        let relay = OutboundEvent::RelayOutput(SetRelayOutput {
            output_name: "kegboard.relay0".to_string(),
            mode: RelayMode::Enabled,
        });
        assert_eq!(level_for(&relay), Level::INFO);
    }

    #[tokio::test]
    async fn test_run_stops_when_publisher_dropped() {
        let publisher = EventPublisher::new(4);
        let handle = tokio::spawn(run(publisher.subscribe()));

        publisher.publish(OutboundEvent::RelayOutput(SetRelayOutput {
            output_name: "kegboard.relay0".to_string(),
            mode: RelayMode::Disabled,
        }));
        drop(publisher);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
