//! authflow - drive auth flows against a backend from the command line.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use client_config_and_utils::{init_logging, Config, Paths};

/// authflow command-line interface.
#[derive(Parser)]
#[command(name = "authflow")]
#[command(about = "Sign in, manage credentials and keep a session fresh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and session files. Defaults to ~/.authflow
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Auth backend base URL
    #[arg(long, global = true)]
    backend_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTHFLOW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTHFLOW_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        redirect_to: Option<String>,
    },
    /// Sign out and forget the local session
    SignOut {
        /// Revoke every session of this user
        #[arg(long)]
        all: bool,
    },
    /// Set a new password
    ChangePassword {
        #[arg(long, env = "AUTHFLOW_NEW_PASSWORD", hide_env_values = true)]
        password: String,
        /// Ticket from a password-reset email
        #[arg(long)]
        ticket: Option<String>,
    },
    /// Email a password-reset link
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        redirect_to: Option<String>,
    },
    /// Request an email address change
    ChangeEmail {
        #[arg(long)]
        email: String,
        #[arg(long)]
        redirect_to: Option<String>,
    },
    /// Resend the verification email
    SendVerificationEmail {
        #[arg(long)]
        email: String,
        #[arg(long)]
        redirect_to: Option<String>,
    },
    /// Refresh the access token now
    Refresh,
    /// Show the local session
    Status,
    /// Keep the session fresh until interrupted
    KeepAlive,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
        config.validate()?;
    }

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level);

    paths.ensure_dirs()?;
    let client = commands::connect(&config, &paths)?;

    match cli.command {
        Commands::SignIn { email, password } => commands::sign_in(&client, email, password).await,
        Commands::SignUp {
            email,
            password,
            display_name,
            redirect_to,
        } => commands::sign_up(&client, email, password, display_name, redirect_to).await,
        Commands::SignOut { all } => commands::sign_out(&client, all).await,
        Commands::ChangePassword { password, ticket } => {
            commands::change_password(&client, password, ticket).await
        }
        Commands::ResetPassword { email, redirect_to } => {
            commands::reset_password(&client, email, redirect_to).await
        }
        Commands::ChangeEmail { email, redirect_to } => {
            commands::change_email(&client, email, redirect_to).await
        }
        Commands::SendVerificationEmail { email, redirect_to } => {
            commands::send_verification_email(&client, email, redirect_to).await
        }
        Commands::Refresh => commands::refresh(&client).await,
        Commands::Status => commands::status(&client),
        Commands::KeepAlive => commands::keep_alive(&client).await,
    }
}
