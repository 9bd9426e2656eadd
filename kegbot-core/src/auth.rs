//! AuthenticationManager: binds physical tokens to users and drives flows.
//!
//! Token presence events are reduced to `user_auth` events and calls into the
//! [`FlowManager`]. At most one token is tracked per tap. How a token's
//! removal is handled depends on its auth device's [`AuthDevicePolicy`]:
//! captive devices end the user's flow, and a non-zero grace window keeps the
//! user authenticated until an expiry alarm fires.
//!
//! [`AuthDevicePolicy`]: kegbot_sdk::config::AuthDevicePolicy

use crate::alarm::AlarmManager;
use crate::backend::Backend;
use crate::events::InboundEvent;
use crate::flow_manager::FlowManager;
use compact_str::CompactString;
use kanau::processor::Processor;
use kegbot_sdk::config::AuthPolicyTable;
use kegbot_sdk::objects::{
    ALL_TAPS_ALIAS, AuthStatus, OutboundEvent, TokenEvent, UserAuthEvent,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Removed,
}

/// The token currently tracked on one tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub auth_device: CompactString,
    pub token_value: CompactString,
    pub tap_name: CompactString,
    /// Resolved by the backend; `None` for unassigned tokens.
    pub username: Option<CompactString>,
    pub last_seen: OffsetDateTime,
    pub status: TokenStatus,
}

impl TokenRecord {
    fn matches(&self, auth_device: &str, token_value: &str) -> bool {
        self.auth_device == auth_device && self.token_value == token_value
    }

    pub fn idle_time(&self, now: OffsetDateTime) -> time::Duration {
        now - self.last_seen
    }
}

impl std::fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Token {}:{}@{} {:?}>",
            self.auth_device, self.token_value, self.tap_name, self.status
        )
    }
}

/// Outcome of registering a presented token.
enum Presented {
    AlreadyActive,
    /// Re-presented during its grace window.
    Returned { username: Option<CompactString> },
    New { replaced: Option<TokenRecord> },
}

pub fn expiry_alarm_name(tap_name: &str) -> CompactString {
    compact_str::format_compact!("token-expiry:{tap_name}")
}

pub struct AuthenticationManager {
    tokens: Mutex<HashMap<CompactString, TokenRecord>>,
    flows: Arc<FlowManager>,
    backend: Arc<dyn Backend>,
    policies: AuthPolicyTable,
    alarms: Arc<AlarmManager<InboundEvent>>,
}

impl AuthenticationManager {
    pub fn new(
        flows: Arc<FlowManager>,
        backend: Arc<dyn Backend>,
        policies: AuthPolicyTable,
        alarms: Arc<AlarmManager<InboundEvent>>,
    ) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            flows,
            backend,
            policies,
            alarms,
        }
    }

    pub fn active_token(&self, tap_name: &str) -> Option<TokenRecord> {
        self.tokens.lock().get(tap_name).cloned()
    }

    pub async fn handle_token_event(&self, event: &TokenEvent, now: OffsetDateTime) {
        for tap_name in self.taps_for(&event.tap_name) {
            match event.status {
                AuthStatus::Added => {
                    self.token_added(&event.auth_device, &event.token_value, &tap_name, now)
                        .await
                }
                AuthStatus::Removed => {
                    self.token_removed(&event.auth_device, &event.token_value, &tap_name, now)
                }
            }
        }
    }

    pub async fn token_added(
        &self,
        auth_device: &str,
        token_value: &str,
        tap_name: &str,
        now: OffsetDateTime,
    ) {
        match self.register_presence(auth_device, token_value, tap_name, now) {
            Presented::AlreadyActive => {
                debug!(tap = %tap_name, "Token already present");
            }
            Presented::Returned { username } => {
                info!(tap = %tap_name, "Token re-presented within grace period");
                self.alarms.cancel_alarm(&expiry_alarm_name(tap_name));
                if let Some(username) = username {
                    self.authorize(auth_device, tap_name, &username, now);
                }
            }
            Presented::New { replaced } => {
                if let Some(previous) = replaced {
                    info!(token = %previous, "Removing previous token");
                    self.alarms.cancel_alarm(&expiry_alarm_name(tap_name));
                    self.deauthenticate(&previous);
                }

                let username = self.lookup_user(auth_device, token_value).await;
                let Some(username) = username else {
                    info!(auth_device, token_value, tap = %tap_name, "Token not assigned");
                    return;
                };
                if !self.bind_username(auth_device, token_value, tap_name, &username) {
                    debug!(tap = %tap_name, "Token replaced during lookup");
                    return;
                }

                info!(user = %username, tap = %tap_name, "User authenticated");
                self.flows
                    .publisher()
                    .publish(OutboundEvent::UserAuth(UserAuthEvent {
                        tap_name: tap_name.to_string(),
                        username: username.to_string(),
                        status: AuthStatus::Added,
                    }));
                self.authorize(auth_device, tap_name, &username, now);
            }
        }
    }

    pub fn token_removed(
        &self,
        auth_device: &str,
        token_value: &str,
        tap_name: &str,
        now: OffsetDateTime,
    ) {
        let grace = self.policies.policy_for(auth_device).grace;
        let expired = {
            let mut tokens = self.tokens.lock();
            let Some(record) = tokens.get_mut(tap_name) else {
                warn!(tap = %tap_name, "Token has already been removed");
                return;
            };
            if !record.matches(auth_device, token_value) {
                warn!(
                    tap = %tap_name,
                    auth_device,
                    token_value,
                    "Removed token is not the one tracked on this tap"
                );
                return;
            }
            if record.status == TokenStatus::Removed {
                debug!(token = %record, "Token removal already pending");
                return;
            }
            record.status = TokenStatus::Removed;
            record.last_seen = now;
            info!(token = %record, "Token detached");
            if grace.is_zero() {
                tokens.remove(tap_name)
            } else {
                None
            }
        };

        match expired {
            Some(record) => self.deauthenticate(&record),
            None => {
                debug!(tap = %tap_name, grace_secs = grace.as_secs(), "Scheduling token expiry");
                self.alarms.add_alarm(
                    expiry_alarm_name(tap_name),
                    Instant::now() + grace,
                    InboundEvent::TokenExpired {
                        tap_name: tap_name.into(),
                    },
                );
            }
        }
    }

    /// Grace window of a removed token ran out.
    pub fn token_expired(&self, tap_name: &str) {
        let expired = {
            let mut tokens = self.tokens.lock();
            let removed = tokens
                .get(tap_name)
                .is_some_and(|record| record.status == TokenStatus::Removed);
            if removed { tokens.remove(tap_name) } else { None }
        };
        match expired {
            Some(record) => {
                info!(token = %record, "Token grace period expired");
                self.deauthenticate(&record);
            }
            None => debug!(tap = %tap_name, "Stale token expiry, ignoring"),
        }
    }

    // -- Private helpers ----------------------------------------------------

    fn taps_for(&self, tap_name: &str) -> Vec<CompactString> {
        let taps = self.flows.taps();
        if tap_name == ALL_TAPS_ALIAS {
            taps.all_taps()
                .iter()
                .map(|tap| CompactString::from(tap.name()))
                .collect()
        } else if taps.tap_exists(tap_name) {
            vec![tap_name.into()]
        } else {
            warn!(tap = %tap_name, "Token event for unknown tap");
            Vec::new()
        }
    }

    fn register_presence(
        &self,
        auth_device: &str,
        token_value: &str,
        tap_name: &str,
        now: OffsetDateTime,
    ) -> Presented {
        let mut tokens = self.tokens.lock();
        if let Some(record) = tokens
            .get_mut(tap_name)
            .filter(|record| record.matches(auth_device, token_value))
        {
            record.last_seen = now;
            if record.status == TokenStatus::Active {
                return Presented::AlreadyActive;
            }
            record.status = TokenStatus::Active;
            return Presented::Returned {
                username: record.username.clone(),
            };
        }

        let record = TokenRecord {
            auth_device: auth_device.into(),
            token_value: token_value.into(),
            tap_name: tap_name.into(),
            username: None,
            last_seen: now,
            status: TokenStatus::Active,
        };
        info!(token = %record, "Token attached");
        let replaced = tokens.insert(tap_name.into(), record);
        Presented::New { replaced }
    }

    /// Store the resolved user on the record, if it is still the tracked
    /// token for the tap.
    fn bind_username(
        &self,
        auth_device: &str,
        token_value: &str,
        tap_name: &str,
        username: &str,
    ) -> bool {
        let mut tokens = self.tokens.lock();
        match tokens.get_mut(tap_name) {
            Some(record) if record.matches(auth_device, token_value) => {
                record.username = Some(username.into());
                true
            }
            _ => false,
        }
    }

    async fn lookup_user(&self, auth_device: &str, token_value: &str) -> Option<CompactString> {
        match self.backend.get_auth_token(auth_device, token_value).await {
            Ok(Some(token)) if token.enabled => token.username.map(CompactString::from),
            Ok(Some(_)) => {
                info!(auth_device, token_value, "Token is disabled");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, auth_device, token_value, "Token lookup failed");
                None
            }
        }
    }

    fn authorize(&self, auth_device: &str, tap_name: &str, username: &str, now: OffsetDateTime) {
        let max_idle = self.policies.policy_for(auth_device).max_idle;
        if let Err(e) = self
            .flows
            .authorize_user(tap_name, username, max_idle, now)
        {
            warn!(error = %e, tap = %tap_name, user = %username, "Could not start flow");
        }
    }

    fn deauthenticate(&self, record: &TokenRecord) {
        let Some(username) = &record.username else {
            return;
        };
        info!(user = %username, tap = %record.tap_name, "User deauthenticated");
        self.flows
            .publisher()
            .publish(OutboundEvent::UserAuth(UserAuthEvent {
                tap_name: record.tap_name.to_string(),
                username: username.to_string(),
                status: AuthStatus::Removed,
            }));

        if !self.policies.policy_for(&record.auth_device).captive {
            debug!(tap = %record.tap_name, "Non-captive auth device, flow left to idle out");
            return;
        }
        let owns_flow = self
            .flows
            .get_flow(&record.tap_name)
            .is_some_and(|flow| flow.username.as_deref() == Some(username.as_str()));
        if owns_flow {
            debug!(tap = %record.tap_name, "Captive auth device, ending flow");
            self.flows.end_flow(&record.tap_name);
        }
    }
}

impl Processor<TokenEvent> for AuthenticationManager {
    type Output = ();
    type Error = Infallible;

    async fn process(&self, event: TokenEvent) -> Result<(), Infallible> {
        self.handle_token_event(&event, OffsetDateTime::now_utc())
            .await;
        Ok(())
    }
}
