use super::{install, require_email, session_from};
use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::protocol::RedirectOptions;
use crate::session::{SessionContext, SessionTokens};
use crate::validators::PasswordPolicy;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

pub(crate) const SIGN_UP_PATH: &str = "/signup";

#[derive(Clone, Default)]
pub struct SignUpRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub redirect_to: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(flatten)]
    redirect: RedirectOptions,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    options: SignUpOptions<'a>,
}

/// Email/password registration.
///
/// When the backend requires email verification no session is returned and
/// the user stays signed out.
pub struct SignUp {
    policy: PasswordPolicy,
}

impl SignUp {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Flow for SignUp {
    type Request = SignUpRequest;
    type Response = Option<SessionTokens>;

    fn name(&self) -> &'static str {
        "sign_up"
    }

    fn validate(&self, request: &SignUpRequest) -> Result<(), ErrorPayload> {
        require_email(request.email.as_deref())?;
        if !self.policy.is_valid(request.password.as_deref()) {
            return Err(ErrorPayload::invalid_password());
        }
        Ok(())
    }

    async fn call(
        &self,
        api: &ApiClient,
        request: SignUpRequest,
    ) -> Result<Option<SessionTokens>, ApiError> {
        let body = SignUpBody {
            email: request.email.as_deref().unwrap_or_default(),
            password: request.password.as_deref().unwrap_or_default(),
            options: SignUpOptions {
                display_name: request.display_name.as_deref(),
                redirect: RedirectOptions {
                    redirect_to: request.redirect_to.clone(),
                },
            },
        };
        let response = api.post_public(SIGN_UP_PATH, &body).await?;
        Ok(session_from(api.session(), response)?)
    }

    fn on_success(
        &self,
        session: &SessionContext,
        tokens: Option<SessionTokens>,
    ) -> Result<(), ErrorPayload> {
        match tokens {
            Some(tokens) => install(session, tokens),
            None => {
                info!("Signed up, awaiting email verification");
                Ok(())
            }
        }
    }
}
