use crate::api::{ApiClient, ApiError};
use crate::error::ErrorPayload;
use crate::flow::Flow;
use crate::session::{AccessToken, SessionContext};
use async_trait::async_trait;

#[derive(Clone, Copy, Debug, Default)]
pub struct RefreshTokenRequest;

/// Explicit token refresh.
///
/// Goes through the session's single-flight gate, so it never races an
/// automatic refresh. The session installs the new tokens itself.
pub struct RefreshToken {
    session: SessionContext,
}

impl RefreshToken {
    pub fn new(session: SessionContext) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Flow for RefreshToken {
    type Request = RefreshTokenRequest;
    type Response = AccessToken;

    fn name(&self) -> &'static str {
        "refresh_token"
    }

    fn validate(&self, _request: &RefreshTokenRequest) -> Result<(), ErrorPayload> {
        if self.session.has_refresh_token() {
            Ok(())
        } else {
            Err(ErrorPayload::no_refresh_token())
        }
    }

    async fn call(&self, api: &ApiClient, _request: RefreshTokenRequest) -> Result<AccessToken, ApiError> {
        Ok(api.session().refresh().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NO_REFRESH_TOKEN;
    use crate::tests::harness::TestEnv;

    #[test]
    fn test_guard_without_session() {
        let env = TestEnv::new();
        let flow = RefreshToken::new(env.session.clone());
        let err = flow.validate(&RefreshTokenRequest).unwrap_err();
        assert_eq!(err.kind(), NO_REFRESH_TOKEN);
    }

    #[test]
    fn test_guard_with_session() {
        let env = TestEnv::new();
        env.sign_in_fresh();
        let flow = RefreshToken::new(env.session.clone());
        assert!(flow.validate(&RefreshTokenRequest).is_ok());
    }

    #[test]
    fn test_guard_with_blank_refresh_token() {
        let env = TestEnv::new();
        env.session
            .apply_tokens(env.tokens("access-1", "", chrono::Duration::minutes(15)))
            .unwrap();
        assert!(env.session.is_authenticated());

        let flow = RefreshToken::new(env.session.clone());
        let err = flow.validate(&RefreshTokenRequest).unwrap_err();
        assert_eq!(err.kind(), NO_REFRESH_TOKEN);
    }
}
