//! Response envelope used by the kegweb API.
//!
//! Every response is a JSON object carrying either a `result` or an `error`:
//!
//! ```json
//! {"result": { ... }}
//! {"error": {"code": "NotFoundError", "message": "no such token"}}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default = "unknown_code")]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub fn is_not_found(&self) -> bool {
        self.code == "NotFoundError"
    }
}

fn unknown_code() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<ApiErrorBody>,
}

/// Why an envelope did not yield a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The server answered with an error object.
    Api(ApiErrorBody),
    /// Neither `result` nor `error` was present.
    Empty,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the envelope. An `error` wins over a `result` if both are set.
    pub fn into_result(self) -> Result<T, EnvelopeError> {
        if let Some(error) = self.error {
            return Err(EnvelopeError::Api(error));
        }
        self.result.ok_or(EnvelopeError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope() {
        let body = r#"{"error": {"code": "NotFoundError", "message": "no token"}}"#;
        let envelope: ApiEnvelope<serde_json::Value> = serde_json::from_str(body).unwrap();
        match envelope.into_result() {
            Err(EnvelopeError::Api(error)) => {
                assert!(error.is_not_found());
                assert_eq!(error.message.as_deref(), Some("no token"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_envelope() {
        let envelope: ApiEnvelope<serde_json::Value> = serde_json::from_str("{}").unwrap();
        assert_eq!(envelope.into_result(), Err(EnvelopeError::Empty));
    }

    #[test]
    fn test_result_envelope() {
        let body = r#"{"result": {"taps": []}}"#;
        let envelope: ApiEnvelope<crate::objects::TapDetailSet> =
            serde_json::from_str(body).unwrap();
        assert!(envelope.into_result().unwrap().taps.is_empty());
    }
}
