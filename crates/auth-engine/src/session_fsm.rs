//! Session lifecycle state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐   TokensApplied   ┌─────────────────┐
//! │    SignedOut    │ ────────────────► │    SignedIn     │ ◄─┐
//! │    (initial)    │ ◄──────────────── │                 │   │ TokensApplied
//! └─────────────────┘      Cleared      └────────┬────────┘ ──┘
//!          ▲                                     │ TokenStale
//!          │ RefreshRejected / Cleared           ▼
//!          │                            ┌─────────────────┐
//!          └─────────────────────────── │   Refreshing    │ ◄─┐ RefreshRetry
//!                                       └────────┬────────┘ ──┘
//!                                                │ RefreshSucceeded / RefreshUnavailable
//!                                                ▼
//!                                            SignedIn
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use client_config_and_utils::RefreshSettings;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(SignedOut)

    SignedOut => {
        TokensApplied => SignedIn,
        Cleared => SignedOut
    },
    SignedIn => {
        TokensApplied => SignedIn,
        TokenStale => Refreshing,
        Cleared => SignedOut
    },
    Refreshing => {
        // A sign-in finished while the refresh was still running
        TokensApplied => SignedIn,
        RefreshSucceeded => SignedIn,
        RefreshRetry => Refreshing,
        // Backend unreachable, tokens are kept for a later attempt
        RefreshUnavailable => SignedIn,
        RefreshRejected => SignedOut,
        Cleared => SignedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Session lifecycle as exposed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    SignedOut,
    SignedIn,
    Refreshing,
}

impl SessionState {
    /// Returns true if a session is held, including while it refreshes.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::SignedIn | SessionState::Refreshing)
    }
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::SignedOut => SessionState::SignedOut,
            SessionMachineState::SignedIn => SessionState::SignedIn,
            SessionMachineState::Refreshing => SessionState::Refreshing,
        }
    }
}

/// Payload for session state change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStateChanged {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Retry behavior for token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Maximum number of attempts, including the first one.
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Delay before retry number `attempt` (0-indexed), doubling up to the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

impl From<&RefreshSettings> for RefreshConfig {
    fn from(settings: &RefreshSettings) -> Self {
        Self {
            max_retries: settings.max_retries.max(1),
            initial_delay_ms: settings.initial_delay_ms,
            max_delay_ms: settings.max_delay_ms,
        }
    }
}
