//! Event plumbing for the accounting core.
//!
//! # Event Flow
//!
//! 1. Device readers, the heartbeat and the alarm dispatcher send
//!    [`InboundEvent`]s to the core service.
//! 2. The core service dispatches them to the flow and authentication
//!    managers, which publish [`OutboundEvent`]s through the
//!    [`EventPublisher`].
//! 3. Completed flows are also sent on the completed-flow channel to the
//!    drink recorder, which publishes `DrinkCreated` once the backend has
//!    stored the pour.
//!
//! [`OutboundEvent`]: kegbot_sdk::objects::OutboundEvent

pub mod channels;
pub mod publisher;
pub mod types;

pub use channels::{
    CompletedFlowReceiver, CompletedFlowSender, DEFAULT_CHANNEL_BUFFER, InboundEventReceiver,
    InboundEventSender, OutboundEventReceiver, completed_flow_channel, inbound_event_channel,
};
pub use publisher::EventPublisher;
pub use types::InboundEvent;
