//! HTTP client for the kegweb API.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

mod kegweb;

pub use kegweb::KegwebClient;

use reqwest::StatusCode;

/// Errors produced by the kegweb client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error envelope.
    #[error("api error {code}: {message}")]
    Api { code: String, message: String },

    /// The server returned a non-2xx status without a readable envelope.
    #[error("api error: status {status}, body: {body}")]
    Status { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The envelope carried neither `result` nor `error`.
    #[error("malformed response: missing result or error")]
    EmptyResponse,
}

impl ClientError {
    /// Whether the server reported that the requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            ClientError::Api { code, .. } => code == "NotFoundError",
            ClientError::Status { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }
}
