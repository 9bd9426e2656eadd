//! Persistence backends.
//!
//! The core never stores anything itself: completed pours, token lookups and
//! the tap list all go through a [`Backend`].

mod memory;
mod web;

pub use memory::MemoryBackend;
pub use web::WebBackend;

use async_trait::async_trait;
use kegbot_sdk::client::ClientError;
use kegbot_sdk::objects::{AuthToken, DrinkRecord, RecordDrinkRequest, TapInfo};
use thiserror::Error;

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The kegweb API call failed.
    #[error("kegweb error: {0}")]
    Client(#[from] ClientError),

    /// The backend refused the request.
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Durably record a completed pour.
    async fn record_drink(&self, request: &RecordDrinkRequest)
    -> Result<DrinkRecord, BackendError>;

    /// Resolve a physical token. `Ok(None)` when the token is unknown.
    async fn get_auth_token(
        &self,
        auth_device: &str,
        token_value: &str,
    ) -> Result<Option<AuthToken>, BackendError>;

    /// Every tap the backend knows about.
    async fn get_all_taps(&self) -> Result<Vec<TapInfo>, BackendError>;
}
