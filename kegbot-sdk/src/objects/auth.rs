//! Authentication token objects.

use serde::{Deserialize, Serialize};

/// Tap name that addresses every registered tap at once.
pub const ALL_TAPS_ALIAS: &str = "__all_taps__";

/// Presence of a token, or of a user, on a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Added,
    Removed,
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStatus::Added => write!(f, "added"),
            AuthStatus::Removed => write!(f, "removed"),
        }
    }
}

impl std::str::FromStr for AuthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(AuthStatus::Added),
            "removed" => Ok(AuthStatus::Removed),
            other => Err(format!("unknown token status: {other}")),
        }
    }
}

/// A user was authenticated on, or removed from, a tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuthEvent {
    pub tap_name: String,
    pub username: String,
    pub status: AuthStatus,
}

/// Token binding as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub auth_device: String,
    pub token_value: String,
    /// `None` when the token exists but is not assigned to anyone.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
