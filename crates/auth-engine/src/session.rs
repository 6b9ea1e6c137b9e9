//! Session context with single-flight token refresh.
//!
//! A [`SessionContext`] is the one live holder of a client's tokens. Every
//! flow and the API client share it through cheap clones. Tokens only change
//! through [`SessionContext::apply_tokens`], [`SessionContext::clear`] and the
//! refresh path, and every change bumps a generation counter so that a
//! refresh finishing after a sign-out or a newer sign-in is discarded.

use crate::clock::Clock;
use crate::error::{AuthError, AuthResult, ErrorCategory, ErrorPayload, SessionError, INVALID_REQUEST};
use crate::protocol::{RefreshTokenBody, SessionPayload};
use crate::session_fsm::{
    RefreshConfig, SessionMachine, SessionMachineInput, SessionState, SessionStateChanged,
};
use crate::transport::{ApiRequest, AuthTransport};
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use session_storage::{SessionStore, StoredSession};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Endpoint that exchanges a refresh token for a new session.
pub const REFRESH_PATH: &str = "/token/refresh";

/// Default margin before expiry at which a token counts as stale.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Short-lived bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Identity returned alongside an issued session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Access token, refresh token and user, replaced as one unit.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: AccessToken,
    pub refresh_token: String,
    pub user: Option<SessionUser>,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &self.access_token)
            .field("refresh_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

impl From<StoredSession> for SessionTokens {
    fn from(stored: StoredSession) -> Self {
        let user = stored.user_id.map(|id| SessionUser {
            id,
            email: stored.email,
            display_name: stored.display_name,
        });
        Self {
            access_token: AccessToken {
                value: stored.access_token,
                expires_at: stored.access_token_expires_at,
            },
            refresh_token: stored.refresh_token,
            user,
        }
    }
}

impl From<&SessionTokens> for StoredSession {
    fn from(tokens: &SessionTokens) -> Self {
        let user = tokens.user.as_ref();
        Self {
            access_token: tokens.access_token.value.clone(),
            access_token_expires_at: tokens.access_token.expires_at,
            refresh_token: tokens.refresh_token.clone(),
            user_id: user.map(|u| u.id.clone()),
            email: user.and_then(|u| u.email.clone()),
            display_name: user.and_then(|u| u.display_name.clone()),
        }
    }
}

/// Tuning for a [`SessionContext`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// A token expiring within this margin is refreshed before use.
    pub clock_skew: Duration,
    pub refresh: RefreshConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            clock_skew: DEFAULT_CLOCK_SKEW,
            refresh: RefreshConfig::default(),
        }
    }
}

/// Callback type for session state change notifications.
pub type SessionListener = Arc<dyn Fn(&SessionStateChanged) + Send + Sync>;

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, SessionError>>>;

#[derive(Default)]
struct TokenSlot {
    tokens: Option<SessionTokens>,
    /// Bumped on every replacement or clear.
    generation: u64,
}

struct InFlightRefresh {
    id: u64,
    future: RefreshFuture,
}

enum Pending {
    Ready(AccessToken),
    Join(RefreshFuture),
    /// A new refresh was spawned; carries the lifecycle change to announce.
    Started(RefreshFuture, Option<SessionState>),
}

/// How a refresh attempt ended.
enum RefreshFailure {
    /// The backend refused the refresh token.
    Rejected(ErrorPayload),
    /// The backend could not be asked.
    Unavailable(ErrorPayload),
}

struct SessionInner {
    tokens: RwLock<TokenSlot>,
    lifecycle: Mutex<SessionMachine>,
    in_flight: Mutex<Option<InFlightRefresh>>,
    next_refresh_id: AtomicU64,
    listeners: Mutex<Vec<SessionListener>>,
    transport: Arc<dyn AuthTransport>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    clock_skew: chrono::Duration,
    refresh_config: RefreshConfig,
}

/// Shared handle to a client's session.
///
/// Cloning is cheap; all clones see the same tokens.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    /// Create an empty (signed out) session context.
    pub fn new(
        transport: Arc<dyn AuthTransport>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Self {
        let clock_skew = chrono::Duration::from_std(options.clock_skew)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_CLOCK_SKEW.as_secs() as i64));

        Self {
            inner: Arc::new(SessionInner {
                tokens: RwLock::new(TokenSlot::default()),
                lifecycle: Mutex::new(SessionMachine::new()),
                in_flight: Mutex::new(None),
                next_refresh_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
                transport,
                store,
                clock,
                clock_skew,
                refresh_config: options.refresh,
            }),
        }
    }

    /// Rehydrate tokens from the session store.
    ///
    /// Returns `Ok(true)` if a session was found. An expired stored token is
    /// kept as is and refreshed on first use.
    pub fn restore(&self) -> AuthResult<bool> {
        let Some(stored) = self.inner.store.load()? else {
            debug!("No persisted session to restore");
            return Ok(false);
        };

        let tokens = SessionTokens::from(stored);
        let user_id = tokens.user.as_ref().map(|u| u.id.clone());
        {
            let mut slot = self.inner.tokens.write();
            slot.tokens = Some(tokens);
            slot.generation += 1;
        }

        info!(user_id = ?user_id, "Restored persisted session");
        self.inner.transition(SessionMachineInput::TokensApplied);
        Ok(true)
    }

    /// Replace the current tokens atomically and persist them.
    ///
    /// Tokens whose access token is already expired are rejected.
    pub fn apply_tokens(&self, tokens: SessionTokens) -> AuthResult<()> {
        let now = self.inner.clock.now();
        if tokens.access_token.expires_at <= now {
            return Err(AuthError::InvalidTokens(format!(
                "access token expired at {}",
                tokens.access_token.expires_at.to_rfc3339()
            )));
        }

        {
            let mut slot = self.inner.tokens.write();
            self.inner.persist(&tokens);
            slot.tokens = Some(tokens);
            slot.generation += 1;
        }

        self.inner.transition(SessionMachineInput::TokensApplied);
        Ok(())
    }

    /// Drop the session locally and in the store.
    ///
    /// A refresh still in flight finishes but its result is discarded.
    pub fn clear(&self) {
        {
            let mut slot = self.inner.tokens.write();
            self.inner.erase();
            slot.tokens = None;
            slot.generation += 1;
        }
        self.inner.in_flight.lock().take();

        info!("Session cleared");
        self.inner.transition(SessionMachineInput::Cleared);
    }

    /// Return an access token that is valid for at least the clock skew
    /// margin, refreshing first when needed.
    ///
    /// Concurrent callers share one refresh and observe the same result.
    pub async fn get_valid_token(&self) -> Result<String, SessionError> {
        match self.pending_refresh(false)? {
            Pending::Ready(token) => Ok(token.value),
            Pending::Join(future) | Pending::Started(future, _) => {
                future.await.map(|token| token.value)
            }
        }
    }

    /// Refresh now, regardless of the current token's expiry.
    ///
    /// Joins a refresh that is already running instead of starting another.
    pub async fn refresh(&self) -> Result<AccessToken, SessionError> {
        match self.pending_refresh(true)? {
            Pending::Ready(token) => Ok(token),
            Pending::Join(future) | Pending::Started(future, _) => future.await,
        }
    }

    /// Register a callback for lifecycle changes.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&SessionStateChanged) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    /// Spawn a background task that refreshes the token ahead of expiry.
    ///
    /// The loop stops when the returned handle is dropped.
    pub fn spawn_auto_refresh(&self, interval: Duration) -> AutoRefreshHandle {
        let session = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !session.needs_refresh() {
                    continue;
                }
                match session.get_valid_token().await {
                    Ok(_) => debug!("Auto-refresh renewed access token"),
                    Err(SessionError::Unauthenticated) => {}
                    Err(e) => warn!(error = %e, "Auto-refresh failed"),
                }
            }
        });

        debug!(interval_secs = interval.as_secs(), "Started session auto-refresh");
        AutoRefreshHandle { handle }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from(self.inner.lifecycle.lock().state())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.read().tokens.is_some()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.inner
            .tokens
            .read()
            .tokens
            .as_ref()
            .is_some_and(|t| !t.refresh_token.is_empty())
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.inner
            .tokens
            .read()
            .tokens
            .as_ref()
            .and_then(|t| t.user.clone())
    }

    pub fn access_token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .tokens
            .read()
            .tokens
            .as_ref()
            .map(|t| t.access_token.expires_at)
    }

    pub(crate) fn refresh_token(&self) -> Option<String> {
        self.inner
            .tokens
            .read()
            .tokens
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn needs_refresh(&self) -> bool {
        self.inner
            .tokens
            .read()
            .tokens
            .as_ref()
            .is_some_and(|t| !self.inner.is_fresh(&t.access_token))
    }

    /// Decide between the current token, the running refresh, or a new one.
    fn pending_refresh(&self, force: bool) -> Result<Pending, SessionError> {
        let pending = self.start_or_join(force)?;
        if let Pending::Started(_, Some(state)) = &pending {
            // Outside the in-flight lock so listeners may call back in
            self.inner.notify(*state);
        }
        Ok(pending)
    }

    fn start_or_join(&self, force: bool) -> Result<Pending, SessionError> {
        let mut in_flight = self.inner.in_flight.lock();
        if let Some(running) = in_flight.as_ref() {
            debug!(refresh_id = running.id, "Joining in-flight token refresh");
            return Ok(Pending::Join(running.future.clone()));
        }

        let (refresh_token, generation) = {
            let slot = self.inner.tokens.read();
            let tokens = slot.tokens.as_ref().ok_or(SessionError::Unauthenticated)?;
            if !force && self.inner.is_fresh(&tokens.access_token) {
                return Ok(Pending::Ready(tokens.access_token.clone()));
            }
            (tokens.refresh_token.clone(), slot.generation)
        };

        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        info!(refresh_id = id, forced = force, "Access token stale, refreshing");
        // Entered before the task can report back
        let changed = self.inner.advance(SessionMachineInput::TokenStale);

        let task = tokio::spawn(SessionInner::run_refresh(
            Arc::clone(&self.inner),
            id,
            refresh_token,
            generation,
        ));
        // Weak: the future is stored inside the session it points to
        let weak = Arc::downgrade(&self.inner);
        let future = async move {
            task.await.unwrap_or_else(|e| {
                // The task died before it could release the slot
                if let Some(inner) = weak.upgrade() {
                    inner.release_in_flight(id);
                    inner.settle_unavailable(generation);
                }
                warn!(refresh_id = id, error = %e, "Token refresh task failed");
                Err(SessionError::Transport(ErrorPayload::transport(format!(
                    "Token refresh task failed: {}",
                    e
                ))))
            })
        }
        .boxed()
        .shared();

        *in_flight = Some(InFlightRefresh {
            id,
            future: future.clone(),
        });
        Ok(Pending::Started(future, changed))
    }
}

impl SessionInner {
    fn is_fresh(&self, token: &AccessToken) -> bool {
        token.expires_at - self.clock.now() > self.clock_skew
    }

    fn persist(&self, tokens: &SessionTokens) {
        if let Err(e) = self.store.save(&StoredSession::from(tokens)) {
            warn!(error = %e, "Failed to persist session");
        }
    }

    fn erase(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    async fn run_refresh(
        inner: Arc<SessionInner>,
        id: u64,
        refresh_token: String,
        generation: u64,
    ) -> Result<AccessToken, SessionError> {
        let outcome = match inner.refresh_with_backoff(&refresh_token).await {
            Ok(tokens) => inner.install_refreshed(generation, tokens),
            Err(RefreshFailure::Rejected(payload)) => {
                warn!(kind = payload.kind(), "Refresh token rejected, clearing session");
                inner.clear_if_current(generation);
                Err(SessionError::SessionExpired(payload))
            }
            Err(RefreshFailure::Unavailable(payload)) => {
                warn!(error = %payload, "Token refresh unavailable, keeping session");
                inner.settle_unavailable(generation);
                Err(SessionError::Transport(payload))
            }
        };

        inner.release_in_flight(id);
        outcome
    }

    /// Leave `Refreshing` with the tokens kept, unless they were replaced.
    fn settle_unavailable(&self, generation: u64) {
        if self.tokens.read().generation == generation {
            self.transition(SessionMachineInput::RefreshUnavailable);
        }
    }

    fn release_in_flight(&self, id: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.as_ref().is_some_and(|running| running.id == id) {
            *in_flight = None;
        }
    }

    async fn refresh_with_backoff(&self, refresh_token: &str) -> Result<SessionTokens, RefreshFailure> {
        let max_attempts = self.refresh_config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match self.request_refresh(refresh_token).await {
                Ok(tokens) => return Ok(tokens),
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    self.transition(SessionMachineInput::RefreshRetry);
                    let delay = self.refresh_config.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Refresh failed with transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if is_rejection(&e) => return Err(RefreshFailure::Rejected(e)),
                Err(e) => return Err(RefreshFailure::Unavailable(e)),
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<SessionTokens, ErrorPayload> {
        let body = serde_json::to_value(RefreshTokenBody { refresh_token })
            .map_err(|e| ErrorPayload::validation(INVALID_REQUEST, e.to_string()))?;

        let value = self
            .transport
            .post(ApiRequest {
                path: REFRESH_PATH.to_string(),
                body,
                bearer: None,
            })
            .await?;

        let payload: SessionPayload = serde_json::from_value(value).map_err(|e| {
            ErrorPayload::invalid_response(format!("Malformed refresh response: {}", e))
        })?;
        let now = self.clock.now();
        let tokens = payload.into_tokens(now)?;
        if tokens.access_token.expires_at <= now {
            return Err(ErrorPayload::invalid_response(format!(
                "Refreshed access token already expired at {}",
                tokens.access_token.expires_at.to_rfc3339()
            )));
        }
        Ok(tokens)
    }

    fn install_refreshed(
        &self,
        generation: u64,
        tokens: SessionTokens,
    ) -> Result<AccessToken, SessionError> {
        let access_token = tokens.access_token.clone();
        {
            let mut slot = self.tokens.write();
            if slot.generation != generation {
                debug!("Discarding refresh result for a replaced session");
                return slot
                    .tokens
                    .as_ref()
                    .map(|current| current.access_token.clone())
                    .ok_or(SessionError::Unauthenticated);
            }
            self.persist(&tokens);
            slot.tokens = Some(tokens);
            slot.generation += 1;
        }

        info!("Token refreshed successfully");
        self.transition(SessionMachineInput::RefreshSucceeded);
        Ok(access_token)
    }

    fn clear_if_current(&self, generation: u64) {
        {
            let mut slot = self.tokens.write();
            if slot.generation != generation {
                return;
            }
            self.erase();
            slot.tokens = None;
            slot.generation += 1;
        }
        self.transition(SessionMachineInput::RefreshRejected);
    }

    /// Feed the lifecycle machine and notify listeners if the state changed.
    fn transition(&self, input: SessionMachineInput) {
        if let Some(new_state) = self.advance(input) {
            self.notify(new_state);
        }
    }

    /// Feed the lifecycle machine. Returns the new state if it changed.
    fn advance(&self, input: SessionMachineInput) -> Option<SessionState> {
        let mut fsm = self.lifecycle.lock();
        let old_state = SessionState::from(fsm.state());
        if fsm.consume(&input).is_err() {
            debug!(input = ?input, state = ?old_state, "Ignoring session input in current state");
            return None;
        }
        let new_state = SessionState::from(fsm.state());
        if old_state == new_state {
            return None;
        }

        debug!(
            old_state = ?old_state,
            new_state = ?new_state,
            "Session state transition"
        );
        Some(new_state)
    }

    fn notify(&self, state: SessionState) {
        let listeners = self.listeners.lock().clone();
        if listeners.is_empty() {
            return;
        }

        let user = self
            .tokens
            .read()
            .tokens
            .as_ref()
            .and_then(|t| t.user.clone());
        let payload = SessionStateChanged {
            state,
            user_id: user.as_ref().map(|u| u.id.clone()),
            email: user.and_then(|u| u.email),
        };
        for listener in listeners {
            listener(&payload);
        }
    }
}

/// A 4xx answer from the backend means the refresh token itself is bad.
fn is_rejection(error: &ErrorPayload) -> bool {
    error.category() == ErrorCategory::Backend
        && error.status().is_some_and(|status| (400..500).contains(&status))
}

/// Stops the auto-refresh loop when dropped.
pub struct AutoRefreshHandle {
    handle: JoinHandle<()>,
}

impl AutoRefreshHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(expires_at: DateTime<Utc>) -> SessionTokens {
        SessionTokens {
            access_token: AccessToken {
                value: "a1".to_string(),
                expires_at,
            },
            refresh_token: "r1".to_string(),
            user: Some(SessionUser {
                id: "u1".to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: None,
            }),
        }
    }

    #[test]
    fn test_stored_session_conversion_keeps_user() {
        let original = tokens(Utc::now());
        let stored = StoredSession::from(&original);
        assert_eq!(stored.user_id.as_deref(), Some("u1"));
        assert_eq!(SessionTokens::from(stored), original);
    }

    #[test]
    fn test_stored_session_without_user() {
        let mut original = tokens(Utc::now());
        original.user = None;
        let restored = SessionTokens::from(StoredSession::from(&original));
        assert!(restored.user.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", tokens(Utc::now()));
        assert!(!rendered.contains("a1"));
        assert!(!rendered.contains("r1"));
        assert!(rendered.contains("u1"));
    }

    #[test]
    fn test_rejection_classification() {
        assert!(is_rejection(&ErrorPayload::backend("invalid-refresh-token", "", Some(401))));
        assert!(!is_rejection(&ErrorPayload::backend("unknown-error", "", Some(503))));
        assert!(!is_rejection(&ErrorPayload::invalid_response("garbled")));
        assert!(!is_rejection(&ErrorPayload::transport("offline")));
    }
}
