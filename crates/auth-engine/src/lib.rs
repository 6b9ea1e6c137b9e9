//! Authentication flows and session orchestration for the authflow client.
//!
//! The pieces, bottom-up:
//! - [`AuthTransport`]: JSON POSTs to the backend ([`HttpTransport`] over `reqwest`)
//! - [`SessionContext`]: the token holder, with single-flight refresh
//! - [`ApiClient`]: attaches the bearer token from the session
//! - [`Flow`] + [`FlowService`]: one request/response state machine per operation
//! - [`AuthClient`]: builds all of the above and hands out flow instances

pub mod api;
pub mod client;
pub mod clock;
pub mod error;
pub mod flow;
pub mod flows;
mod protocol;
pub mod service;
pub mod session;
pub mod session_fsm;
pub mod transport;
pub mod validators;

#[cfg(test)]
mod tests;

pub use api::{ApiClient, ApiError};
pub use client::{AuthClient, ClientOptions};
pub use clock::{Clock, SystemClock};
pub use error::{AuthError, AuthResult, ErrorCategory, ErrorPayload, SessionError};
pub use flow::{Effect, Flow, FlowContext, FlowEvent, FlowNotification, FlowState, Status};
pub use protocol::RedirectOptions;
pub use service::{FlowService, FlowSnapshot};
pub use session::{
    AccessToken, AutoRefreshHandle, SessionContext, SessionOptions, SessionTokens, SessionUser,
};
pub use session_fsm::{RefreshConfig, SessionState, SessionStateChanged};
pub use transport::{ApiRequest, AuthTransport, HttpTransport};
pub use validators::{is_valid_email, is_valid_password, PasswordPolicy};
