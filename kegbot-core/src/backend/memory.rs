//! In-process backend: tokens come from configuration, drinks are kept in
//! memory. Used for standalone setups and tests.

use super::{Backend, BackendError};
use async_trait::async_trait;
use kegbot_sdk::objects::{AuthToken, DrinkRecord, RecordDrinkRequest, TapInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryBackend {
    tokens: HashMap<(String, String), AuthToken>,
    taps: Vec<TapInfo>,
    drinks: Mutex<Vec<DrinkRecord>>,
    /// Number of upcoming `record_drink` calls to fail.
    failures: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(mut self, tokens: impl IntoIterator<Item = AuthToken>) -> Self {
        for token in tokens {
            self.tokens.insert(
                (token.auth_device.clone(), token.token_value.clone()),
                token,
            );
        }
        self
    }

    pub fn with_taps(mut self, taps: Vec<TapInfo>) -> Self {
        self.taps = taps;
        self
    }

    /// Make the next `count` drink recordings fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn drinks(&self) -> Vec<DrinkRecord> {
        self.drinks.lock().clone()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn record_drink(
        &self,
        request: &RecordDrinkRequest,
    ) -> Result<DrinkRecord, BackendError> {
        if self.take_failure() {
            return Err(BackendError::Rejected("simulated failure".to_string()));
        }
        let mut drinks = self.drinks.lock();
        let record = DrinkRecord {
            id: i64::try_from(drinks.len()).unwrap_or(i64::MAX).saturating_add(1),
            ticks: request.ticks,
            volume_ml: request.volume_ml,
            username: request.username.clone(),
            keg_id: None,
            pour_time: request.pour_time,
        };
        drinks.push(record.clone());
        Ok(record)
    }

    async fn get_auth_token(
        &self,
        auth_device: &str,
        token_value: &str,
    ) -> Result<Option<AuthToken>, BackendError> {
        Ok(self
            .tokens
            .get(&(auth_device.to_string(), token_value.to_string()))
            .cloned())
    }

    async fn get_all_taps(&self) -> Result<Vec<TapInfo>, BackendError> {
        Ok(self.taps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn request() -> RecordDrinkRequest {
        let now = OffsetDateTime::UNIX_EPOCH;
        RecordDrinkRequest {
            flow_id: 1,
            tap_name: "kegboard.flow0".to_string(),
            ticks: 100,
            volume_ml: 50.0,
            username: Some("alice".to_string()),
            pour_time: now,
            start_time: now,
            duration_secs: 0,
            auth_token: None,
            spilled: false,
        }
    }

    #[tokio::test]
    async fn test_records_drinks_in_order() {
        let backend = MemoryBackend::new();
        let first = backend.record_drink(&request()).await.unwrap();
        let second = backend.record_drink(&request()).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(backend.drinks().len(), 2);
        assert_eq!(first.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_simulated_failures() {
        let backend = MemoryBackend::new();
        backend.fail_next(1);
        assert!(backend.record_drink(&request()).await.is_err());
        assert!(backend.record_drink(&request()).await.is_ok());
        assert_eq!(backend.drinks().len(), 1);
    }

    #[tokio::test]
    async fn test_token_lookup() {
        let backend = MemoryBackend::new().with_tokens([AuthToken {
            auth_device: "core.onewire".to_string(),
            token_value: "0000111122223333".to_string(),
            username: Some("alice".to_string()),
            enabled: true,
        }]);
        let token = backend
            .get_auth_token("core.onewire", "0000111122223333")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.username.as_deref(), Some("alice"));
        assert!(
            backend
                .get_auth_token("core.rfid", "0000111122223333")
                .await
                .unwrap()
                .is_none()
        );
    }
}
