//! Kegweb REST API client (core → web backend).
//!
//! Requests carry the API key as an `api_key` form field (POST) or query
//! parameter (GET). Endpoints always end with a trailing slash.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use url::Url;

use super::ClientError;
use crate::objects::{
    ApiEnvelope, AuthToken, DrinkRecord, EnvelopeError, RecordDrinkRequest, TapDetailSet, TapInfo,
};

/// Typed HTTP client for the kegweb API.
#[derive(Debug, Clone)]
pub struct KegwebClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl KegwebClient {
    /// Create a new `KegwebClient`.
    ///
    /// * `base_url` – root of the API (e.g. `http://localhost:8000/api/`).
    /// * `api_key` – key attached to every request, if any.
    pub fn new(mut base_url: Url, api_key: Option<String>) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http: Client::new(),
            base_url,
            api_key,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST taps/<tap_name>/` – record a completed pour.
    pub async fn record_drink(
        &self,
        request: &RecordDrinkRequest,
    ) -> Result<DrinkRecord, ClientError> {
        let url = self.endpoint(&format!("taps/{}", request.tap_name))?;

        let mut form: Vec<(&str, String)> = vec![
            ("tap_name", request.tap_name.clone()),
            ("ticks", request.ticks.to_string()),
            ("volume_ml", request.volume_ml.to_string()),
            ("duration", request.duration_secs.to_string()),
            ("spilled", request.spilled.to_string()),
            ("pour_time", request.pour_time.unix_timestamp().to_string()),
            (
                "now",
                OffsetDateTime::now_utc().unix_timestamp().to_string(),
            ),
        ];
        if let Some(username) = &request.username {
            form.push(("username", username.clone()));
        }
        if let Some(token) = &request.auth_token {
            form.push(("auth_token", token.clone()));
        }
        if let Some(key) = &self.api_key {
            form.push(("api_key", key.clone()));
        }

        let resp = self.http.post(url).form(&form).send().await?;
        parse_envelope(resp).await
    }

    /// `GET auth-tokens/<auth_device>.<token_value>/` – look up a token.
    pub async fn get_auth_token(
        &self,
        auth_device: &str,
        token_value: &str,
    ) -> Result<AuthToken, ClientError> {
        let url = self.endpoint(&format!("auth-tokens/{auth_device}.{token_value}"))?;
        let resp = self.get(url).send().await?;
        parse_envelope(resp).await
    }

    /// `GET taps/` – list every configured tap.
    pub async fn tap_status(&self) -> Result<Vec<TapInfo>, ClientError> {
        let url = self.endpoint("taps")?;
        let resp = self.get(url).send().await?;
        let set: TapDetailSet = parse_envelope(resp).await?;
        Ok(set.taps.into_iter().map(|detail| detail.tap).collect())
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.api_key {
            Some(key) => request.query(&[("api_key", key)]),
            None => request,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let mut url = self.base_url.join(path.trim_matches('/'))?;
        let with_slash = format!("{}/", url.path());
        url.set_path(&with_slash);
        Ok(url)
    }
}

async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    decode_envelope(status, &bytes)
}

fn decode_envelope<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> Result<T, ClientError> {
    let envelope: ApiEnvelope<T> = match serde_json::from_slice(bytes) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(bytes).into_owned(),
            });
        }
        Err(e) => return Err(ClientError::Json(e)),
    };
    envelope.into_result().map_err(|e| match e {
        EnvelopeError::Api(body) => ClientError::Api {
            code: body.code,
            message: body.message.unwrap_or_default(),
        },
        EnvelopeError::Empty => ClientError::EmptyResponse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let base = Url::parse("http://localhost:8000/api").unwrap();
        let client = KegwebClient::new(base, None);
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
        assert_eq!(
            client.endpoint("taps/kegboard.flow0").unwrap().as_str(),
            "http://localhost:8000/api/taps/kegboard.flow0/"
        );
        assert_eq!(
            client.endpoint("/auth-tokens/core.rfid.0001/").unwrap().as_str(),
            "http://localhost:8000/api/auth-tokens/core.rfid.0001/"
        );
    }

    #[test]
    fn test_decode_drink_record() {
        let body = br#"{"result": {"id": 42, "ticks": 400, "volume_ml": 200.0, "user_id": "alice", "keg_id": 3, "pour_time": "2026-01-02T03:04:05Z"}}"#;
        let drink: DrinkRecord = decode_envelope(StatusCode::OK, body).unwrap();
        assert_eq!(drink.id, 42);
        assert_eq!(drink.ticks, 400);
        assert_eq!(drink.username.as_deref(), Some("alice"));
        assert_eq!(drink.keg_id, Some(3));
    }

    #[test]
    fn test_decode_auth_token_not_found() {
        let body = br#"{"error": {"code": "NotFoundError", "message": "no such token"}}"#;
        let err = decode_envelope::<AuthToken>(StatusCode::NOT_FOUND, body).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_decode_unreadable_error_body() {
        let err = decode_envelope::<DrinkRecord>(StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert!(matches!(err, ClientError::Status { status, .. } if status == StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn test_decode_empty_envelope() {
        let err = decode_envelope::<DrinkRecord>(StatusCode::OK, b"{}").unwrap_err();
        assert!(matches!(err, ClientError::EmptyResponse));
    }
}
