use super::require_email;
use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::protocol::RedirectOptions;
use async_trait::async_trait;
use serde::Serialize;

pub(crate) const CHANGE_EMAIL_PATH: &str = "/user/email/change";

#[derive(Clone, Default)]
pub struct ChangeEmailRequest {
    pub email: Option<String>,
    pub redirect_to: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeEmailBody<'a> {
    new_email: &'a str,
    options: RedirectOptions,
}

/// Request an email address change for the signed-in user.
///
/// The change only takes effect once the user follows the confirmation link.
pub struct ChangeEmail;

#[async_trait]
impl Flow for ChangeEmail {
    type Request = ChangeEmailRequest;
    type Response = ();

    fn name(&self) -> &'static str {
        "change_email"
    }

    fn validate(&self, request: &ChangeEmailRequest) -> Result<(), ErrorPayload> {
        require_email(request.email.as_deref())
    }

    async fn call(&self, api: &ApiClient, request: ChangeEmailRequest) -> Result<(), ApiError> {
        let body = ChangeEmailBody {
            new_email: request.email.as_deref().unwrap_or_default(),
            options: RedirectOptions {
                redirect_to: request.redirect_to,
            },
        };
        api.post_authenticated(CHANGE_EMAIL_PATH, &body).await?;
        Ok(())
    }
}
