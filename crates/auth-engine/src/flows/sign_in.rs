use super::{install, require_email, session_from};
use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::session::{SessionContext, SessionTokens};
use crate::validators::PasswordPolicy;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

pub(crate) const SIGN_IN_PATH: &str = "/signin";

#[derive(Clone, Default)]
pub struct SignInRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
struct SignInBody<'a> {
    email: &'a str,
    password: &'a str,
}

/// Email/password sign-in. Installs the issued session.
pub struct SignIn {
    policy: PasswordPolicy,
}

impl SignIn {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Flow for SignIn {
    type Request = SignInRequest;
    type Response = SessionTokens;

    fn name(&self) -> &'static str {
        "sign_in"
    }

    fn validate(&self, request: &SignInRequest) -> Result<(), ErrorPayload> {
        require_email(request.email.as_deref())?;
        if !self.policy.is_valid(request.password.as_deref()) {
            return Err(ErrorPayload::invalid_password());
        }
        Ok(())
    }

    async fn call(&self, api: &ApiClient, request: SignInRequest) -> Result<SessionTokens, ApiError> {
        let body = SignInBody {
            email: request.email.as_deref().unwrap_or_default(),
            password: request.password.as_deref().unwrap_or_default(),
        };
        let response = api.post_public(SIGN_IN_PATH, &body).await?;
        session_from(api.session(), response)?.ok_or_else(|| {
            ApiError::Failure(ErrorPayload::invalid_response(
                "Sign-in response did not include a session",
            ))
        })
    }

    fn on_success(&self, session: &SessionContext, tokens: SessionTokens) -> Result<(), ErrorPayload> {
        let user_id = tokens.user.as_ref().map(|u| u.id.clone());
        install(session, tokens)?;
        info!(user_id = ?user_id, "Signed in");
        Ok(())
    }
}
