//! Events published by the core to its consumers.
//!
//! Serialized as an adjacently-tagged JSON object so consumers can dispatch
//! on the `"event"` field:
//!
//! ```json
//! {"event":"flow_progress","data":{"flow_id":1, ... }}
//! ```

use serde::{Deserialize, Serialize};

use super::auth::UserAuthEvent;
use super::drink::DrinkCreated;
use super::flow::{FlowStateChange, FlowUpdate};
use super::relay::SetRelayOutput;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A flow changed state, or its bound username changed.
    FlowChanged(FlowStateChange),
    /// More ticks were credited to an already active flow.
    FlowProgress(FlowUpdate),
    DrinkCreated(DrinkCreated),
    UserAuth(UserAuthEvent),
    RelayOutput(SetRelayOutput),
}

impl OutboundEvent {
    /// The flow snapshot carried by this event, if any.
    pub fn flow_update(&self) -> Option<&FlowUpdate> {
        match self {
            OutboundEvent::FlowChanged(change) => Some(&change.update),
            OutboundEvent::FlowProgress(update) => Some(update),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::FlowChanged(_) => "flow_changed",
            OutboundEvent::FlowProgress(_) => "flow_progress",
            OutboundEvent::DrinkCreated(_) => "drink_created",
            OutboundEvent::UserAuth(_) => "user_auth",
            OutboundEvent::RelayOutput(_) => "relay_output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::RelayMode;

    #[test]
    fn test_event_tagging() {
        let event = OutboundEvent::RelayOutput(SetRelayOutput {
            output_name: "kegboard.relay0".to_string(),
            mode: RelayMode::Enabled,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "relay_output");
        assert_eq!(json["data"]["mode"], "enabled");
        assert_eq!(event.kind(), "relay_output");
    }
}
