//! Fitness CLI
//!
//! Command-line front end for the fitness API:
//! 1. Loads configuration and the stored session
//! 2. Registers the session interceptor so expired tokens renew transparently
//! 3. Runs one command and prints its JSON result to stdout

mod commands;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use api_client::{ApiClient, AuthSession};
use session_store::FileStore;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Invocation;
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match commands::parse(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{message}\n\n{}", commands::USAGE);
            return ExitCode::from(2);
        }
    };

    match run(invocation).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing on stderr with LOG_LEVEL / RUST_LOG support.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(invocation: Invocation) -> Result<ExitCode> {
    let config_path = Config::resolve_path(invocation.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        storage = %config.storage.path.display(),
        "configuration loaded"
    );

    let store = FileStore::load(config.storage.path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open session store at {}",
                config.storage.path.display()
            )
        })?;
    debug!(path = %store.path().display(), "session store opened");

    let client = ApiClient::connect(&config.client_config(), Arc::new(store));
    let session = AuthSession::new(client);
    let _interceptor = session.attach();

    if let Err(e) = session.load_user_data().await {
        warn!(error = %e, "stored session unreadable, continuing signed out");
    }

    let command = invocation.command;
    if command.requires_session() && session.user().is_none() {
        eprintln!("not signed in; run `fitness-cli login <email> <password>` first");
        return Ok(ExitCode::FAILURE);
    }

    match commands::execute(&session, &command).await {
        Ok(output) => {
            let rendered =
                serde_json::to_string_pretty(&output).context("failed to render output")?;
            println!("{rendered}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            warn!(error = %e, "command failed");
            eprintln!("{}", e.user_message(command.fallback_message()));
            Ok(ExitCode::FAILURE)
        }
    }
}
