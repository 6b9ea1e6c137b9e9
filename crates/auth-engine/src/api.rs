//! Request helper that attaches the session's bearer token.

use crate::error::{ErrorPayload, SessionError, INVALID_REQUEST};
use crate::session::SessionContext;
use crate::transport::{ApiRequest, AuthTransport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Why an API call did not produce a response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No usable session; the user has to sign in again.
    #[error(transparent)]
    Session(SessionError),

    /// The request itself failed.
    #[error(transparent)]
    Failure(ErrorPayload),
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            // Refresh was unreachable; the session still stands
            SessionError::Transport(payload) => ApiError::Failure(payload),
            other => ApiError::Session(other),
        }
    }
}

impl From<ErrorPayload> for ApiError {
    fn from(payload: ErrorPayload) -> Self {
        ApiError::Failure(payload)
    }
}

/// Thin client over an [`AuthTransport`].
///
/// Does no retries and no interpretation of response bodies.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn AuthTransport>,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn AuthTransport>, session: SessionContext) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// POST without credentials.
    pub async fn post_public<B>(&self, path: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        self.send(path, body, None).await
    }

    /// POST with `Authorization: Bearer <token>`, refreshing the token first
    /// if it is about to expire.
    pub async fn post_authenticated<B>(&self, path: &str, body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let token = self.session.get_valid_token().await?;
        self.send(path, body, Some(token)).await
    }

    /// POST with the bearer token when signed in, and without it otherwise.
    ///
    /// For requests that carry their own proof of identity. A refresh that
    /// could not reach the backend still fails the request.
    pub async fn post_optionally_authenticated<B>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let bearer = match self.session.get_valid_token().await {
            Ok(token) => Some(token),
            Err(SessionError::Transport(payload)) => return Err(ApiError::Failure(payload)),
            Err(_) => None,
        };
        self.send(path, body, bearer).await
    }

    async fn send<B>(&self, path: &str, body: &B, bearer: Option<String>) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| ErrorPayload::validation(INVALID_REQUEST, e.to_string()))?;

        let response = self
            .transport
            .post(ApiRequest {
                path: path.to_string(),
                body,
                bearer,
            })
            .await?;
        Ok(response)
    }
}

/// Decode a response body, mapping shape mismatches to `invalid-response`.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ErrorPayload> {
    serde_json::from_value(value)
        .map_err(|e| ErrorPayload::invalid_response(format!("Unexpected response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_session_transport_error_becomes_failure() {
        let payload = ErrorPayload::transport("offline");
        let error = ApiError::from(SessionError::Transport(payload.clone()));
        assert_eq!(error, ApiError::Failure(payload));
    }

    #[test]
    fn test_session_loss_stays_session_error() {
        let error = ApiError::from(SessionError::Unauthenticated);
        assert_eq!(error, ApiError::Session(SessionError::Unauthenticated));
    }

    #[test]
    fn test_decode_reports_invalid_response() {
        #[derive(Debug, Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            id: String,
        }

        let err = decode::<Needs>(json!({"other": 1})).unwrap_err();
        assert_eq!(err.kind(), crate::error::INVALID_RESPONSE);
    }
}
