//! Flow snapshots as seen by consumers of the core.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lifecycle state of a flow.
///
/// `Initial` is the entry state. A flow moves to `Active` on its first
/// accepted tick, to `Idle` when it times out, and ends as `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    Initial,
    Active,
    Idle,
    Completed,
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowState::Initial => write!(f, "initial"),
            FlowState::Active => write!(f, "active"),
            FlowState::Idle => write!(f, "idle"),
            FlowState::Completed => write!(f, "completed"),
        }
    }
}

/// Point-in-time snapshot of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowUpdate {
    pub flow_id: u64,
    pub tap_name: String,
    pub state: FlowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Time of the last accepted tick, or `start_time` if none arrived yet.
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_time: OffsetDateTime,
    pub ticks: u64,
    pub volume_ml: f64,
}

impl FlowUpdate {
    /// Time between the start of the flow and its last activity.
    pub fn duration(&self) -> time::Duration {
        self.last_activity_time - self.start_time
    }
}

/// A flow transition, or an explicit username change on a flow.
///
/// `previous` is `None` when the flow was just created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStateChange {
    pub previous: Option<FlowState>,
    pub update: FlowUpdate,
}
