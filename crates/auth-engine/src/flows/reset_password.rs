use super::require_email;
use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::protocol::RedirectOptions;
use async_trait::async_trait;
use serde::Serialize;

pub(crate) const RESET_PASSWORD_PATH: &str = "/user/password/reset";

#[derive(Clone, Default)]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub redirect_to: Option<String>,
}

#[derive(Serialize)]
struct ResetPasswordBody<'a> {
    email: &'a str,
    options: RedirectOptions,
}

/// Ask the backend to email a password-reset link.
pub struct ResetPassword;

#[async_trait]
impl Flow for ResetPassword {
    type Request = ResetPasswordRequest;
    type Response = ();

    fn name(&self) -> &'static str {
        "reset_password"
    }

    fn validate(&self, request: &ResetPasswordRequest) -> Result<(), ErrorPayload> {
        require_email(request.email.as_deref())
    }

    async fn call(&self, api: &ApiClient, request: ResetPasswordRequest) -> Result<(), ApiError> {
        let body = ResetPasswordBody {
            email: request.email.as_deref().unwrap_or_default(),
            options: RedirectOptions {
                redirect_to: request.redirect_to,
            },
        };
        api.post_public(RESET_PASSWORD_PATH, &body).await?;
        Ok(())
    }
}
