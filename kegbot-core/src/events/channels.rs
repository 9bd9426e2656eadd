//! Channel factories and handle aliases.

use super::types::InboundEvent;
use kegbot_sdk::objects::{FlowUpdate, OutboundEvent};
use tokio::sync::mpsc;

/// Default buffer size for bounded event channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for inbound events (devices, heartbeat, alarms).
pub type InboundEventSender = mpsc::Sender<InboundEvent>;
/// Receiver handle for inbound events, owned by the core service.
pub type InboundEventReceiver = mpsc::Receiver<InboundEvent>;

/// Sender handle for completed flow snapshots.
///
/// Unbounded: a completed pour is real consumed volume and is never dropped
/// for lack of queue space.
pub type CompletedFlowSender = mpsc::UnboundedSender<FlowUpdate>;
/// Receiver handle for completed flow snapshots, owned by the drink recorder.
pub type CompletedFlowReceiver = mpsc::UnboundedReceiver<FlowUpdate>;

/// Receiver handle for one outbound event subscriber.
pub type OutboundEventReceiver = mpsc::Receiver<OutboundEvent>;

/// Create the inbound event channel.
///
/// Every device reader, the heartbeat and the alarm dispatcher hold a clone
/// of the sender.
pub fn inbound_event_channel() -> (InboundEventSender, InboundEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

pub fn completed_flow_channel() -> (CompletedFlowSender, CompletedFlowReceiver) {
    mpsc::unbounded_channel()
}
