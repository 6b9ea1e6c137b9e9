use super::require_email;
use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::protocol::RedirectOptions;
use async_trait::async_trait;
use serde::Serialize;

pub(crate) const SEND_VERIFICATION_EMAIL_PATH: &str = "/user/email/send-verification-email";

#[derive(Clone, Default)]
pub struct SendVerificationEmailRequest {
    pub email: Option<String>,
    pub redirect_to: Option<String>,
}

#[derive(Serialize)]
struct SendVerificationEmailBody<'a> {
    email: &'a str,
    options: RedirectOptions,
}

/// Resend the address verification email.
pub struct SendVerificationEmail;

#[async_trait]
impl Flow for SendVerificationEmail {
    type Request = SendVerificationEmailRequest;
    type Response = ();

    fn name(&self) -> &'static str {
        "send_verification_email"
    }

    fn validate(&self, request: &SendVerificationEmailRequest) -> Result<(), ErrorPayload> {
        require_email(request.email.as_deref())
    }

    async fn call(
        &self,
        api: &ApiClient,
        request: SendVerificationEmailRequest,
    ) -> Result<(), ApiError> {
        let body = SendVerificationEmailBody {
            email: request.email.as_deref().unwrap_or_default(),
            options: RedirectOptions {
                redirect_to: request.redirect_to,
            },
        };
        api.post_public(SEND_VERIFICATION_EMAIL_PATH, &body).await?;
        Ok(())
    }
}
