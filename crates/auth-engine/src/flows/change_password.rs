use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::validators::PasswordPolicy;
use async_trait::async_trait;
use serde::Serialize;

pub(crate) const CHANGE_PASSWORD_PATH: &str = "/user/password";

#[derive(Clone, Default)]
pub struct ChangePasswordRequest {
    pub password: Option<String>,
    /// Ticket from a password-reset email. Lets a signed-out user set a
    /// new password.
    pub ticket: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordBody<'a> {
    new_password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ticket: Option<&'a str>,
}

/// Set a new password for the signed-in user, or for the holder of a
/// password-reset ticket.
pub struct ChangePassword {
    policy: PasswordPolicy,
}

impl ChangePassword {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Flow for ChangePassword {
    type Request = ChangePasswordRequest;
    type Response = ();

    fn name(&self) -> &'static str {
        "change_password"
    }

    fn validate(&self, request: &ChangePasswordRequest) -> Result<(), ErrorPayload> {
        if self.policy.is_valid(request.password.as_deref()) {
            Ok(())
        } else {
            Err(ErrorPayload::invalid_password())
        }
    }

    async fn call(&self, api: &ApiClient, request: ChangePasswordRequest) -> Result<(), ApiError> {
        let body = ChangePasswordBody {
            new_password: request.password.as_deref().unwrap_or_default(),
            ticket: request.ticket.as_deref(),
        };
        if body.ticket.is_some() {
            api.post_optionally_authenticated(CHANGE_PASSWORD_PATH, &body)
                .await?;
        } else {
            api.post_authenticated(CHANGE_PASSWORD_PATH, &body).await?;
        }
        Ok(())
    }
}
