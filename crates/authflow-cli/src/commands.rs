//! Subcommand implementations.
//!
//! Every flow command runs one request to completion, prints the settled
//! snapshot as JSON and fails the process unless the flow succeeded.

use anyhow::{bail, Context, Result};
use auth_engine::flows::{
    ChangeEmailRequest, ChangePasswordRequest, RefreshTokenRequest, ResetPasswordRequest,
    SendVerificationEmailRequest, SignInRequest, SignOutRequest, SignUpRequest,
};
use auth_engine::{AuthClient, FlowSnapshot, FlowState, SessionState, SessionUser, Status};
use chrono::{DateTime, Utc};
use client_config_and_utils::{Config, Paths};
use serde::Serialize;
use session_storage::file_vault;
use std::sync::Arc;
use tracing::info;

/// Build a client whose session is persisted under `paths`.
pub fn connect(config: &Config, paths: &Paths) -> Result<AuthClient> {
    let store = Arc::new(file_vault(paths.session_file()));
    let client = AuthClient::from_config(config, store).context("Failed to create auth client")?;
    if client.restore().context("Failed to load saved session")? {
        info!("Using saved session");
    }
    Ok(client)
}

fn report(snapshot: &FlowSnapshot) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    match &snapshot.state {
        FlowState::Idle(Status::Success) => Ok(()),
        FlowState::Idle(Status::Error(payload)) => bail!("{}", payload),
        FlowState::Idle(Status::SignInRequired) => bail!("Not signed in, run `authflow sign-in`"),
        other => bail!("Flow did not settle ({})", other.label()),
    }
}

pub async fn sign_in(client: &AuthClient, email: String, password: String) -> Result<()> {
    let flow = client.sign_in();
    let snapshot = flow
        .request(SignInRequest {
            email: Some(email),
            password: Some(password),
        })
        .await;
    report(&snapshot)
}

pub async fn sign_up(
    client: &AuthClient,
    email: String,
    password: String,
    display_name: Option<String>,
    redirect_to: Option<String>,
) -> Result<()> {
    let flow = client.sign_up();
    let snapshot = flow
        .request(SignUpRequest {
            email: Some(email),
            password: Some(password),
            display_name,
            redirect_to,
        })
        .await;
    report(&snapshot)?;
    if !client.session().is_authenticated() {
        println!("Check your inbox to verify your email address.");
    }
    Ok(())
}

pub async fn sign_out(client: &AuthClient, all: bool) -> Result<()> {
    let flow = client.sign_out();
    let snapshot = flow.request(SignOutRequest { all }).await;
    report(&snapshot)
}

pub async fn change_password(
    client: &AuthClient,
    password: String,
    ticket: Option<String>,
) -> Result<()> {
    let flow = client.change_password();
    let snapshot = flow
        .request(ChangePasswordRequest {
            password: Some(password),
            ticket,
        })
        .await;
    report(&snapshot)
}

pub async fn reset_password(
    client: &AuthClient,
    email: String,
    redirect_to: Option<String>,
) -> Result<()> {
    let flow = client.reset_password();
    let snapshot = flow
        .request(ResetPasswordRequest {
            email: Some(email),
            redirect_to,
        })
        .await;
    report(&snapshot)
}

pub async fn change_email(
    client: &AuthClient,
    email: String,
    redirect_to: Option<String>,
) -> Result<()> {
    let flow = client.change_email();
    let snapshot = flow
        .request(ChangeEmailRequest {
            email: Some(email),
            redirect_to,
        })
        .await;
    report(&snapshot)
}

pub async fn send_verification_email(
    client: &AuthClient,
    email: String,
    redirect_to: Option<String>,
) -> Result<()> {
    let flow = client.send_verification_email();
    let snapshot = flow
        .request(SendVerificationEmailRequest {
            email: Some(email),
            redirect_to,
        })
        .await;
    report(&snapshot)
}

pub async fn refresh(client: &AuthClient) -> Result<()> {
    let flow = client.refresh_token();
    let snapshot = flow.request(RefreshTokenRequest).await;
    report(&snapshot)
}

#[derive(Serialize)]
struct StatusReport {
    state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<SessionUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token_expires_at: Option<DateTime<Utc>>,
}

pub fn status(client: &AuthClient) -> Result<()> {
    let session = client.session();
    let report = StatusReport {
        state: session.state(),
        user: session.user(),
        access_token_expires_at: session.access_token_expires_at(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn keep_alive(client: &AuthClient) -> Result<()> {
    if !client.session().is_authenticated() {
        bail!("Not signed in, run `authflow sign-in`");
    }

    client.session().subscribe(|change| {
        info!(state = ?change.state, user_id = ?change.user_id, "Session state changed");
    });
    let _refresh = client.start_auto_refresh();
    info!("Keeping session fresh, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Stopping");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_engine::ErrorPayload;
    use tempfile::tempdir;

    #[test]
    fn test_report_success() {
        let snapshot = FlowSnapshot {
            state: FlowState::Idle(Status::Success),
            context: Default::default(),
        };
        assert!(report(&snapshot).is_ok());
    }

    #[test]
    fn test_report_error_carries_message() {
        let payload = ErrorPayload::invalid_password();
        let snapshot = FlowSnapshot {
            state: FlowState::Idle(Status::Error(payload.clone())),
            context: auth_engine::FlowContext {
                error: Some(payload),
            },
        };
        let err = report(&snapshot).unwrap_err();
        assert!(err.to_string().contains("invalid-password"));
    }

    #[test]
    fn test_report_sign_in_required() {
        let snapshot = FlowSnapshot {
            state: FlowState::Idle(Status::SignInRequired),
            context: Default::default(),
        };
        assert!(report(&snapshot).is_err());
    }

    #[tokio::test]
    async fn test_connect_without_saved_session() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config::default();

        let client = connect(&config, &paths).unwrap();
        assert!(!client.session().is_authenticated());
        assert_eq!(client.session().state(), SessionState::SignedOut);
    }

    #[tokio::test]
    async fn test_validation_failure_without_backend() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let client = connect(&Config::default(), &paths).unwrap();

        let err = sign_in(&client, "not-an-email".to_string(), "Str0ngPass!".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid-email"));
    }
}
