//! Inbound event types.
//!
//! Everything that drives the accounting core arrives as one closed
//! [`InboundEvent`] enum, dispatched with a single `match` by the core
//! service.

use compact_str::CompactString;
use kegbot_sdk::objects::{FlowRequest, HeartbeatTick, MeterUpdate, TokenEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Raw odometer reading from a device.
    Meter(MeterUpdate),
    /// Periodic tick driving idle detection and relay keep-alive.
    Heartbeat(HeartbeatTick),
    /// An auth token was presented or taken away.
    Token(TokenEvent),
    /// Explicit start/stop request for a tap.
    FlowRequest(FlowRequest),
    /// Grace period of a removed token ran out.
    TokenExpired { tap_name: CompactString },
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Meter(_) => "meter",
            InboundEvent::Heartbeat(_) => "heartbeat",
            InboundEvent::Token(_) => "token",
            InboundEvent::FlowRequest(_) => "flow_request",
            InboundEvent::TokenExpired { .. } => "token_expired",
        }
    }
}

impl From<MeterUpdate> for InboundEvent {
    fn from(event: MeterUpdate) -> Self {
        InboundEvent::Meter(event)
    }
}

impl From<HeartbeatTick> for InboundEvent {
    fn from(event: HeartbeatTick) -> Self {
        InboundEvent::Heartbeat(event)
    }
}

impl From<TokenEvent> for InboundEvent {
    fn from(event: TokenEvent) -> Self {
        InboundEvent::Token(event)
    }
}

impl From<FlowRequest> for InboundEvent {
    fn from(event: FlowRequest) -> Self {
        InboundEvent::FlowRequest(event)
    }
}
