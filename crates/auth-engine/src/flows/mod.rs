//! Concrete auth flows.
//!
//! Each flow is a small [`Flow`](crate::flow::Flow) implementation: a request
//! type, a synchronous guard, one backend call and an optional session
//! effect.

mod change_email;
mod change_password;
mod refresh_token;
mod reset_password;
mod send_verification_email;
mod sign_in;
mod sign_out;
mod sign_up;

pub use change_email::{ChangeEmail, ChangeEmailRequest};
pub use change_password::{ChangePassword, ChangePasswordRequest};
pub use refresh_token::{RefreshToken, RefreshTokenRequest};
pub use reset_password::{ResetPassword, ResetPasswordRequest};
pub use send_verification_email::{SendVerificationEmail, SendVerificationEmailRequest};
pub use sign_in::{SignIn, SignInRequest};
pub use sign_out::{SignOut, SignOutRequest};
pub use sign_up::{SignUp, SignUpRequest};

use crate::api::decode;
use crate::error::ErrorPayload;
use crate::protocol::SessionEnvelope;
use crate::session::{SessionContext, SessionTokens};
use crate::validators::is_valid_email;
use serde_json::Value;

pub(crate) fn require_email(email: Option<&str>) -> Result<(), ErrorPayload> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ErrorPayload::invalid_email())
    }
}

/// Extract the optional session from a sign-in or sign-up response.
pub(crate) fn session_from(
    session: &SessionContext,
    body: Value,
) -> Result<Option<SessionTokens>, ErrorPayload> {
    let envelope: SessionEnvelope = decode(body)?;
    envelope
        .session
        .map(|payload| payload.into_tokens(session.now()))
        .transpose()
}

/// Install issued tokens, mapping invariant violations to `invalid-response`.
pub(crate) fn install(session: &SessionContext, tokens: SessionTokens) -> Result<(), ErrorPayload> {
    session
        .apply_tokens(tokens)
        .map_err(|e| ErrorPayload::invalid_response(e.to_string()))
}
