//! HTTP transport to the auth backend.
//!
//! Every auth operation is a JSON `POST` relative to the backend base URL.
//! Failures are normalized into [`ErrorPayload`] here so nothing above this
//! layer sees `reqwest` types.

use crate::error::{AuthResult, ErrorPayload, INVALID_RESPONSE, UNKNOWN_ERROR};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// A single request to the auth backend.
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    /// Endpoint path, e.g. `/user/password`.
    pub path: String,
    /// JSON body.
    pub body: Value,
    /// Access token sent as `Authorization: Bearer`.
    pub bearer: Option<String>,
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bodies carry passwords and tokens
        f.debug_struct("ApiRequest")
            .field("path", &self.path)
            .field("authenticated", &self.bearer.is_some())
            .finish_non_exhaustive()
    }
}

/// Sends auth requests to the backend.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// POST `request` and return the decoded JSON response body.
    ///
    /// An empty successful body decodes to `Value::Null`.
    async fn post(&self, request: ApiRequest) -> Result<Value, ErrorPayload>;
}

/// `{"error": {"kind": .., "message": ..}}`
#[derive(Deserialize)]
struct NestedFailure {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(alias = "error")]
    kind: String,
    #[serde(default)]
    message: String,
}

/// `{"error": "kind", "message": ..}`
#[derive(Deserialize)]
struct FlatFailure {
    error: String,
    #[serde(default)]
    message: String,
}

/// Normalize a non-success response into an [`ErrorPayload`].
pub(crate) fn parse_failure_body(status: u16, body: &str) -> ErrorPayload {
    if let Ok(nested) = serde_json::from_str::<NestedFailure>(body) {
        return ErrorPayload::backend(nested.error.kind, nested.error.message, Some(status));
    }
    if let Ok(flat) = serde_json::from_str::<FlatFailure>(body) {
        return ErrorPayload::backend(flat.error, flat.message, Some(status));
    }
    ErrorPayload::backend(
        UNKNOWN_ERROR,
        format!("Request failed with status {}", status),
        Some(status),
    )
}

fn describe_send_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request to auth backend timed out".to_string()
    } else if error.is_connect() {
        "Could not connect to auth backend".to_string()
    } else {
        format!("Request to auth backend failed: {}", error)
    }
}

/// [`AuthTransport`] over `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url` with a per-request timeout.
    pub fn new(base_url: Url, timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn post(&self, request: ApiRequest) -> Result<Value, ErrorPayload> {
        let url = self.endpoint(&request.path);
        debug!(url = %url, authenticated = request.bearer.is_some(), "Sending auth request");

        let mut builder = self.http_client.post(&url).json(&request.body);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Auth request did not reach backend");
            ErrorPayload::transport(describe_send_error(&e))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ErrorPayload::transport(describe_send_error(&e)))?;

        if !status.is_success() {
            let body_summary = summarize_response_body(&body);
            warn!(url = %url, status = %status, body_summary = %body_summary, "Auth request failed");
            return Err(parse_failure_body(status.as_u16(), &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            ErrorPayload::backend(
                INVALID_RESPONSE,
                format!("Response from {} is not valid JSON: {}", request.path, e),
                Some(status.as_u16()),
            )
        })
    }
}
