//! Backend speaking to the kegweb REST API.

use super::{Backend, BackendError};
use async_trait::async_trait;
use kegbot_sdk::client::KegwebClient;
use kegbot_sdk::objects::{AuthToken, DrinkRecord, RecordDrinkRequest, TapInfo};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct WebBackend {
    client: KegwebClient,
}

impl WebBackend {
    pub fn new(api_url: Url, api_key: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client: KegwebClient::new(api_url, api_key).with_http_client(http),
        }
    }

    pub fn from_client(client: KegwebClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Backend for WebBackend {
    fn name(&self) -> &'static str {
        "web"
    }

    #[tracing::instrument(skip_all, err, name = "web_record_drink", fields(tap = %request.tap_name))]
    async fn record_drink(
        &self,
        request: &RecordDrinkRequest,
    ) -> Result<DrinkRecord, BackendError> {
        let record = self.client.record_drink(request).await?;
        debug!(drink_id = record.id, "Drink recorded");
        Ok(record)
    }

    #[tracing::instrument(skip_all, err, name = "web_get_auth_token")]
    async fn get_auth_token(
        &self,
        auth_device: &str,
        token_value: &str,
    ) -> Result<Option<AuthToken>, BackendError> {
        match self.client.get_auth_token(auth_device, token_value).await {
            Ok(token) => Ok(Some(token)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all, err, name = "web_get_all_taps")]
    async fn get_all_taps(&self) -> Result<Vec<TapInfo>, BackendError> {
        Ok(self.client.tap_status().await?)
    }
}
