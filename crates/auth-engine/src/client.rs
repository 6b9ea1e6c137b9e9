//! Client facade that wires the session, transport and flows together.

use crate::api::ApiClient;
use crate::clock::{Clock, SystemClock};
use crate::error::AuthResult;
use crate::flows::{
    ChangeEmail, ChangePassword, RefreshToken, ResetPassword, SendVerificationEmail, SignIn,
    SignOut, SignUp,
};
use crate::service::FlowService;
use crate::session::{AutoRefreshHandle, SessionContext, SessionOptions};
use crate::session_fsm::RefreshConfig;
use crate::transport::{AuthTransport, HttpTransport};
use crate::validators::PasswordPolicy;
use client_config_and_utils::Config;
use session_storage::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Tunables for an [`AuthClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub session: SessionOptions,
    pub password_policy: PasswordPolicy,
    pub auto_refresh_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            password_policy: PasswordPolicy::default(),
            auto_refresh_interval: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            session: SessionOptions {
                clock_skew: config.clock_skew(),
                refresh: RefreshConfig::from(&config.refresh),
            },
            password_policy: PasswordPolicy::new(config.min_password_length),
            auto_refresh_interval: config.auto_refresh_interval(),
        }
    }
}

/// One auth client: a session plus a factory for flow instances.
///
/// Every flow created here shares the same [`SessionContext`].
#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
    options: ClientOptions,
}

impl AuthClient {
    pub fn new(
        transport: Arc<dyn AuthTransport>,
        store: Arc<dyn SessionStore>,
        options: ClientOptions,
    ) -> Self {
        Self::with_clock(transport, store, Arc::new(SystemClock), options)
    }

    pub fn with_clock(
        transport: Arc<dyn AuthTransport>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        options: ClientOptions,
    ) -> Self {
        let session = SessionContext::new(
            Arc::clone(&transport),
            store,
            clock,
            options.session.clone(),
        );
        Self {
            api: ApiClient::new(transport, session),
            options,
        }
    }

    /// Build a client that talks HTTP to the configured backend.
    pub fn from_config(config: &Config, store: Arc<dyn SessionStore>) -> AuthResult<Self> {
        let base_url = config.backend_url()?;
        info!(backend_url = %base_url, "Creating auth client");
        let transport = HttpTransport::new(base_url, config.request_timeout())?;
        Ok(Self::new(
            Arc::new(transport),
            store,
            ClientOptions::from(config),
        ))
    }

    pub fn session(&self) -> &SessionContext {
        self.api.session()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Load a persisted session, if any.
    pub fn restore(&self) -> AuthResult<bool> {
        self.session().restore()
    }

    /// Keep the access token fresh in the background until the handle drops.
    pub fn start_auto_refresh(&self) -> AutoRefreshHandle {
        self.session()
            .spawn_auto_refresh(self.options.auto_refresh_interval)
    }

    pub fn sign_in(&self) -> FlowService<SignIn> {
        FlowService::new(SignIn::new(self.options.password_policy), self.api.clone())
    }

    pub fn sign_up(&self) -> FlowService<SignUp> {
        FlowService::new(SignUp::new(self.options.password_policy), self.api.clone())
    }

    pub fn change_password(&self) -> FlowService<ChangePassword> {
        FlowService::new(
            ChangePassword::new(self.options.password_policy),
            self.api.clone(),
        )
    }

    pub fn reset_password(&self) -> FlowService<ResetPassword> {
        FlowService::new(ResetPassword, self.api.clone())
    }

    pub fn change_email(&self) -> FlowService<ChangeEmail> {
        FlowService::new(ChangeEmail, self.api.clone())
    }

    pub fn send_verification_email(&self) -> FlowService<SendVerificationEmail> {
        FlowService::new(SendVerificationEmail, self.api.clone())
    }

    pub fn refresh_token(&self) -> FlowService<RefreshToken> {
        FlowService::new(RefreshToken::new(self.session().clone()), self.api.clone())
    }

    pub fn sign_out(&self) -> FlowService<SignOut> {
        FlowService::new(SignOut, self.api.clone())
    }
}
