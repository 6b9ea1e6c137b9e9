//! Test harness for auth engine scenarios.
//!
//! Provides:
//! - MockTransport: scripted responses per path, call recording and a gate
//!   that holds requests until released
//! - ManualClock: a clock that only moves when told to
//! - RecordingStore: a SessionStore that counts saves and clears
//! - TestEnv: an AuthClient wired to all three

use crate::client::{AuthClient, ClientOptions};
use crate::clock::Clock;
use crate::error::{ErrorPayload, UNKNOWN_ERROR};
use crate::session::{AccessToken, SessionContext, SessionTokens, SessionUser};
use crate::session_fsm::RefreshConfig;
use crate::transport::{ApiRequest, AuthTransport};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use session_storage::{SessionStore, StorageResult, StoredSession};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Scripted answer for one request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Ok(Value),
    Fail(ErrorPayload),
    /// Panic inside the transport, as a buggy backend adapter would.
    Panic(&'static str),
}

/// Transport that answers from per-path queues.
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
    gate: watch::Sender<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            gate,
        }
    }

    /// Queue a response for the next request to `path`.
    pub fn queue(&self, path: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn queue_ok(&self, path: &str, body: Value) {
        self.queue(path, MockResponse::Ok(body));
    }

    pub fn queue_fail(&self, path: &str, payload: ErrorPayload) {
        self.queue(path, MockResponse::Fail(payload));
    }

    pub fn queue_panic(&self, path: &str, message: &'static str) {
        self.queue(path, MockResponse::Panic(message));
    }

    /// Hold every request until [`MockTransport::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Wait until `count` requests to `path` were received.
    pub async fn wait_for_calls(&self, path: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.calls_to(path) < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for transport calls");
    }
}

#[async_trait]
impl AuthTransport for MockTransport {
    async fn post(&self, request: ApiRequest) -> Result<Value, ErrorPayload> {
        let path = request.path.clone();
        self.requests.lock().push(request);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let next = self
            .responses
            .lock()
            .get_mut(&path)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(MockResponse::Ok(body)) => Ok(body),
            Some(MockResponse::Fail(payload)) => Err(payload),
            Some(MockResponse::Panic(message)) => panic!("{}", message),
            None => Err(ErrorPayload::backend(
                UNKNOWN_ERROR,
                format!("no response scripted for {}", path),
                None,
            )),
        }
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// In-memory store that counts writes.
#[derive(Default)]
pub struct RecordingStore {
    session: Mutex<Option<StoredSession>>,
    saves: Mutex<usize>,
    clears: Mutex<usize>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        let store = Self::default();
        *store.session.lock() = Some(session);
        store
    }

    pub fn stored(&self) -> Option<StoredSession> {
        self.session.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn clear_count(&self) -> usize {
        *self.clears.lock()
    }
}

impl SessionStore for RecordingStore {
    fn load(&self) -> StorageResult<Option<StoredSession>> {
        Ok(self.session.lock().clone())
    }

    fn save(&self, session: &StoredSession) -> StorageResult<()> {
        *self.session.lock() = Some(session.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.session.lock() = None;
        *self.clears.lock() += 1;
        Ok(())
    }
}

/// Options with millisecond backoff so retry tests stay fast.
pub fn fast_options() -> ClientOptions {
    let mut options = ClientOptions::default();
    options.session.refresh = RefreshConfig {
        max_retries: 3,
        initial_delay_ms: 1,
        max_delay_ms: 5,
    };
    options
}

/// Backend session body as returned by sign-in and refresh.
pub fn session_json(access_token: &str, refresh_token: &str, expires_in: i64) -> Value {
    json!({
        "accessToken": access_token,
        "accessTokenExpiresIn": expires_in,
        "refreshToken": refresh_token,
        "user": {"id": "user-1", "email": "ada@example.com"}
    })
}

pub fn rejected(kind: &str) -> ErrorPayload {
    ErrorPayload::backend(kind, "rejected by backend", Some(401))
}

pub fn unreachable() -> ErrorPayload {
    ErrorPayload::transport("connection refused")
}

/// An AuthClient wired to mocks.
pub struct TestEnv {
    pub transport: Arc<MockTransport>,
    pub store: Arc<RecordingStore>,
    pub clock: Arc<ManualClock>,
    pub client: AuthClient,
    pub session: SessionContext,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_store(RecordingStore::new())
    }

    pub fn with_store(store: RecordingStore) -> Self {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new());
        let client = AuthClient::with_clock(
            transport.clone(),
            store.clone(),
            clock.clone(),
            fast_options(),
        );
        let session = client.session().clone();

        Self {
            transport,
            store,
            clock,
            client,
            session,
        }
    }

    pub fn tokens(&self, access: &str, refresh: &str, lifetime: ChronoDuration) -> SessionTokens {
        SessionTokens {
            access_token: AccessToken {
                value: access.to_string(),
                expires_at: self.clock.now() + lifetime,
            },
            refresh_token: refresh.to_string(),
            user: Some(SessionUser {
                id: "user-1".to_string(),
                email: Some("ada@example.com".to_string()),
                display_name: None,
            }),
        }
    }

    /// Signed in with `access-1`/`refresh-1`, valid for 15 minutes.
    pub fn sign_in_fresh(&self) {
        self.session
            .apply_tokens(self.tokens("access-1", "refresh-1", ChronoDuration::minutes(15)))
            .unwrap();
    }

    /// Signed in with `access-1`/`refresh-1`, expiring inside the skew margin.
    pub fn sign_in_stale(&self) {
        self.session
            .apply_tokens(self.tokens("access-1", "refresh-1", ChronoDuration::seconds(30)))
            .unwrap();
    }
}
