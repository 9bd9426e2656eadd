//! Events flowing into the core from devices and timers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::auth::AuthStatus;

/// Raw odometer reading reported by the meter behind `tap_name`.
///
/// The reading is signed on the wire; the core rejects negative values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterUpdate {
    pub tap_name: String,
    pub reading: i64,
}

/// A physical token appeared at, or left, an auth device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub auth_device: String,
    pub token_value: String,
    pub tap_name: String,
    pub status: AuthStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowAction {
    Start,
    Stop,
}

impl std::str::FromStr for FlowAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(FlowAction::Start),
            "stop" => Ok(FlowAction::Stop),
            other => Err(format!("unknown flow action: {other}")),
        }
    }
}

/// Explicit request to start or stop a flow on a tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequest {
    pub tap_name: String,
    pub action: FlowAction,
}

/// Periodic heartbeat driving idle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatTick {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl HeartbeatTick {
    pub fn now() -> Self {
        Self {
            at: OffsetDateTime::now_utc(),
        }
    }
}
