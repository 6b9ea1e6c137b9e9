//! Wire shapes shared by several endpoints.

use crate::error::ErrorPayload;
use crate::session::{AccessToken, SessionTokens, SessionUser};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Session returned by sign-in, sign-up and token refresh.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionPayload {
    access_token: String,
    /// Lifetime in seconds from the moment of issue.
    access_token_expires_in: i64,
    refresh_token: String,
    #[serde(default)]
    user: Option<UserPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl SessionPayload {
    /// Anchor the relative expiry at `now`.
    ///
    /// A lifetime that does not fit a timestamp is an `invalid-response`.
    pub(crate) fn into_tokens(self, now: DateTime<Utc>) -> Result<SessionTokens, ErrorPayload> {
        let expires_in = self.access_token_expires_in;
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                ErrorPayload::invalid_response(format!(
                    "Access token lifetime out of range: {}",
                    expires_in
                ))
            })?;

        Ok(SessionTokens {
            access_token: AccessToken {
                value: self.access_token,
                expires_at,
            },
            refresh_token: self.refresh_token,
            user: self.user.map(|user| SessionUser {
                id: user.id,
                email: user.email,
                display_name: user.display_name,
            }),
        })
    }
}

/// `{"session": {...} | null}` as returned by sign-in and sign-up.
#[derive(Deserialize)]
pub(crate) struct SessionEnvelope {
    #[serde(default)]
    pub(crate) session: Option<SessionPayload>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshTokenBody<'a> {
    pub(crate) refresh_token: &'a str,
}

/// Options shared by endpoints that send an email with a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}
