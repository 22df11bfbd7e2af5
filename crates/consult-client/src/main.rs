//! Consultation preflight
//!
//! Checks that a user can obtain a session credential for a consultation
//! before the call view is opened.
//!
//! # Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Perform one credential exchange for `--id`, `--user`, `--role`
//! 4. Report the room id (never the token)

#![warn(clippy::pedantic)]

use anyhow::{Context, Result};
use clap::Parser;
use consult_client::config::Config;
use consult_client::credential::{CredentialExchange, CredentialRequest, HttpCredentialExchange};
use consult_client::observability::init_tracing;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "consult-preflight", version, about = "Verify a consultation credential exchange")]
struct Cli {
    /// Meeting or appointment id, depending on CONSULT_EXCHANGE_STYLE.
    #[arg(long)]
    id: String,

    /// Requesting user id.
    #[arg(long)]
    user: String,

    /// PATIENT or DOCTOR.
    #[arg(long, default_value = "PATIENT")]
    role: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(&config.observability).context("Failed to initialize tracing")?;

    info!(
        exchange_url = %config.exchange_url,
        exchange_style = ?config.exchange_style,
        http_timeout_seconds = config.http_timeout_seconds,
        "Configuration loaded successfully"
    );

    let request = CredentialRequest::parse(&cli.id, &cli.user, &cli.role)
        .context("Invalid preflight arguments")?;

    let exchange = HttpCredentialExchange::new(
        config.exchange_url.clone(),
        config.exchange_style,
        config.http_timeout(),
    )?;

    match exchange.exchange(&request).await {
        Ok(credential) => {
            info!(
                room_id = %credential.room_id(),
                role = %credential.issued_for_role(),
                "Credential exchange succeeded"
            );
            println!("room: {}", credential.room_id());
            Ok(())
        }
        Err(e) => {
            error!(error_type = e.error_type(), error = %e, "Credential exchange failed");
            Err(anyhow::anyhow!(e.client_message()))
        }
    }
}
