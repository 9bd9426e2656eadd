//! Drink records produced from completed flows.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::flow::FlowUpdate;

/// Everything the backend needs to persist one pour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDrinkRequest {
    pub flow_id: u64,
    pub tap_name: String,
    pub ticks: u64,
    pub volume_ml: f64,
    #[serde(default)]
    pub username: Option<String>,
    /// End of the pour.
    #[serde(with = "time::serde::rfc3339")]
    pub pour_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    pub duration_secs: i64,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub spilled: bool,
}

impl From<&FlowUpdate> for RecordDrinkRequest {
    fn from(flow: &FlowUpdate) -> Self {
        Self {
            flow_id: flow.flow_id,
            tap_name: flow.tap_name.clone(),
            ticks: flow.ticks,
            volume_ml: flow.volume_ml,
            username: flow.username.clone(),
            pour_time: flow.last_activity_time,
            start_time: flow.start_time,
            duration_secs: flow.duration().whole_seconds(),
            auth_token: None,
            spilled: false,
        }
    }
}

/// A drink as persisted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkRecord {
    pub id: i64,
    pub ticks: u64,
    pub volume_ml: f64,
    /// The user the backend attributed the drink to, if any.
    #[serde(default, rename = "user_id")]
    pub username: Option<String>,
    #[serde(default)]
    pub keg_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub pour_time: OffsetDateTime,
}

/// Published once a completed flow has been durably recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkCreated {
    pub flow_id: u64,
    pub drink_id: i64,
    pub tap_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl DrinkCreated {
    /// Build the notification for `record`, persisted from `request`.
    pub fn new(request: &RecordDrinkRequest, record: &DrinkRecord) -> Self {
        Self {
            flow_id: request.flow_id,
            drink_id: record.id,
            tap_name: request.tap_name.clone(),
            start_time: request.start_time,
            end_time: request.pour_time,
            username: record.username.clone().or_else(|| request.username.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::flow::FlowState;

    #[test]
    fn test_request_mirrors_completed_snapshot() {
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let end = OffsetDateTime::from_unix_timestamp(1_700_000_007).unwrap();
        let flow = FlowUpdate {
            flow_id: 42,
            tap_name: "kegboard.flow0".to_string(),
            state: FlowState::Completed,
            username: Some("alice".to_string()),
            start_time: start,
            last_activity_time: end,
            ticks: 100,
            volume_ml: 50.0,
        };

        let request = RecordDrinkRequest::from(&flow);
        assert_eq!(request.flow_id, 42);
        assert_eq!(request.tap_name, "kegboard.flow0");
        assert_eq!(request.ticks, 100);
        assert_eq!(request.volume_ml, 50.0);
        assert_eq!(request.username.as_deref(), Some("alice"));
        assert_eq!(request.start_time, start);
        assert_eq!(request.pour_time, end);
        assert_eq!(request.duration_secs, 7);
    }

    #[test]
    fn test_drink_created_prefers_backend_user() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let request = RecordDrinkRequest {
            flow_id: 1,
            tap_name: "t".to_string(),
            ticks: 10,
            volume_ml: 20.0,
            username: None,
            pour_time: at,
            start_time: at,
            duration_secs: 0,
            auth_token: None,
            spilled: false,
        };
        let record = DrinkRecord {
            id: 9,
            ticks: 10,
            volume_ml: 20.0,
            username: Some("guest".to_string()),
            keg_id: Some(3),
            pour_time: at,
        };
        let created = DrinkCreated::new(&request, &record);
        assert_eq!(created.drink_id, 9);
        assert_eq!(created.username.as_deref(), Some("guest"));
    }
}
