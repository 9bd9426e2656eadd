//! Tap listing returned by the kegweb `taps` endpoint.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapInfo {
    /// Display name of the tap.
    pub name: String,
    /// Identifier of the meter, used as the tap name inside the core.
    pub meter_name: String,
    pub ml_per_tick: f64,
    #[serde(default)]
    pub relay_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapDetail {
    pub tap: TapInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapDetailSet {
    #[serde(default)]
    pub taps: Vec<TapDetail>,
}
