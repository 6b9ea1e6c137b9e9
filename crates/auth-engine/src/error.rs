//! Error taxonomy shared by every flow machine.
//!
//! Three layers:
//! - [`ErrorPayload`]: the value a flow stores in its context and shows to the UI
//! - [`SessionError`]: why the session could not produce a bearer token
//! - [`AuthError`]: wiring failures (config, storage, client construction)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Email failed the local shape check.
pub const INVALID_EMAIL: &str = "invalid-email";
/// Password failed the local strength check.
pub const INVALID_PASSWORD: &str = "invalid-password";
/// Ticket was rejected by the backend.
pub const INVALID_TICKET: &str = "invalid-ticket";
/// A refresh was requested without a session to refresh.
pub const NO_REFRESH_TOKEN: &str = "no-refresh-token";
/// The request body could not be encoded.
pub const INVALID_REQUEST: &str = "invalid-request";
/// The backend answered with a body this client does not understand.
pub const INVALID_RESPONSE: &str = "invalid-response";
/// The backend could not be reached.
pub const NETWORK_ERROR: &str = "network-error";
/// The backend failed without a structured error.
pub const UNKNOWN_ERROR: &str = "unknown-error";

/// Where an error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected locally before any network call.
    Validation,
    /// The backend rejected the operation.
    #[default]
    Backend,
    /// The backend could not be reached (network, timeout).
    Transport,
}

/// Error value stored in flow context.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ErrorPayload {
    kind: String,
    message: String,
    #[serde(default)]
    category: ErrorCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

impl ErrorPayload {
    /// Local, pre-network failure.
    pub fn validation(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            category: ErrorCategory::Validation,
            status: None,
        }
    }

    /// Failure reported by the backend.
    pub fn backend(kind: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            category: ErrorCategory::Backend,
            status,
        }
    }

    /// Failure to reach the backend at all.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: NETWORK_ERROR.to_string(),
            message: message.into(),
            category: ErrorCategory::Transport,
            status: None,
        }
    }

    pub fn invalid_email() -> Self {
        Self::validation(INVALID_EMAIL, "Email is incorrectly formatted")
    }

    pub fn invalid_password() -> Self {
        Self::validation(INVALID_PASSWORD, "Password is incorrectly formatted")
    }

    pub fn no_refresh_token() -> Self {
        Self::validation(NO_REFRESH_TOKEN, "No refresh token available")
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::backend(INVALID_RESPONSE, message, None)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns true if retrying the same request later can succeed.
    ///
    /// Transient errors are transport failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self.category {
            ErrorCategory::Transport => true,
            ErrorCategory::Backend => self.status.is_some_and(|status| status >= 500),
            ErrorCategory::Validation => false,
        }
    }
}

/// Why the session could not produce a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No session at all.
    #[error("Not signed in")]
    Unauthenticated,

    /// The refresh token was rejected; the session has been cleared.
    #[error("Session expired: {0}")]
    SessionExpired(ErrorPayload),

    /// The refresh endpoint could not be reached; the session is kept.
    #[error("Token refresh unavailable: {0}")]
    Transport(ErrorPayload),
}

impl SessionError {
    /// Returns true if the user has to sign in again.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            SessionError::Unauthenticated | SessionError::SessionExpired(_)
        )
    }
}

/// Errors from constructing and wiring the client.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] client_config_and_utils::CoreError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Tokens violate the session invariants
    #[error("Invalid tokens: {0}")]
    InvalidTokens(String),

    /// Session error
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_payload() {
        let payload = ErrorPayload::invalid_password();
        assert_eq!(payload.kind(), INVALID_PASSWORD);
        assert_eq!(payload.category(), ErrorCategory::Validation);
        assert!(payload.status().is_none());
        assert!(!payload.is_transient());
    }

    #[test]
    fn test_transport_payload_is_transient() {
        let payload = ErrorPayload::transport("connection refused");
        assert_eq!(payload.kind(), NETWORK_ERROR);
        assert!(payload.is_transient());
    }

    #[test]
    fn test_backend_transience_follows_status() {
        assert!(ErrorPayload::backend(UNKNOWN_ERROR, "boom", Some(503)).is_transient());
        assert!(!ErrorPayload::backend(INVALID_TICKET, "bad", Some(401)).is_transient());
        assert!(!ErrorPayload::backend(INVALID_TICKET, "bad", None).is_transient());
    }

    #[test]
    fn test_payload_display() {
        let payload = ErrorPayload::backend(INVALID_TICKET, "Ticket is invalid", Some(401));
        assert_eq!(payload.to_string(), "invalid-ticket: Ticket is invalid");
    }

    #[test]
    fn test_payload_deserializes_without_category() {
        let payload: ErrorPayload =
            serde_json::from_str(r#"{"kind":"invalid-ticket","message":"nope"}"#).unwrap();
        assert_eq!(payload.kind(), INVALID_TICKET);
        assert_eq!(payload.category(), ErrorCategory::Backend);
    }

    #[test]
    fn test_session_error_requires_sign_in() {
        assert!(SessionError::Unauthenticated.requires_sign_in());
        assert!(
            SessionError::SessionExpired(ErrorPayload::backend("invalid-refresh-token", "", None))
                .requires_sign_in()
        );
        assert!(!SessionError::Transport(ErrorPayload::transport("offline")).requires_sign_in());
    }
}
