use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::session::SessionContext;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

pub(crate) const SIGN_OUT_PATH: &str = "/signout";

#[derive(Clone, Copy, Debug, Default)]
pub struct SignOutRequest {
    /// Revoke every session of the user, not just this one.
    pub all: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignOutBody<'a> {
    refresh_token: &'a str,
    all: bool,
}

/// Revoke the session on the backend and drop it locally.
///
/// The local session is cleared whether or not the backend call succeeds.
pub struct SignOut;

#[async_trait]
impl Flow for SignOut {
    type Request = SignOutRequest;
    type Response = ();

    fn name(&self) -> &'static str {
        "sign_out"
    }

    fn validate(&self, _request: &SignOutRequest) -> Result<(), ErrorPayload> {
        Ok(())
    }

    async fn call(&self, api: &ApiClient, request: SignOutRequest) -> Result<(), ApiError> {
        let Some(refresh_token) = api.session().refresh_token() else {
            debug!("No session to revoke");
            return Ok(());
        };

        let body = SignOutBody {
            refresh_token: &refresh_token,
            all: request.all,
        };
        // Revoking every session needs the user's bearer token
        if request.all {
            api.post_authenticated(SIGN_OUT_PATH, &body).await?;
        } else {
            api.post_public(SIGN_OUT_PATH, &body).await?;
        }
        Ok(())
    }

    fn on_success(&self, session: &SessionContext, _response: ()) -> Result<(), ErrorPayload> {
        session.clear();
        info!("Signed out");
        Ok(())
    }

    fn on_failure(&self, session: &SessionContext) {
        session.clear();
    }
}
