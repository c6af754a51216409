//! deck: local-first card and task board

mod commands;
mod config;
mod session;

use std::process::ExitCode;
use std::sync::Arc;

use deck_core::Error;
use deck_remote::RestClient;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Command;
use crate::config::Config;
use crate::session::Session;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deck=info,deck_core=info,deck_remote=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!("Command failed: {:#}", err);
            eprintln!("{}", describe(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> anyhow::Result<()> {
    let command = Command::parse(args)?;
    let config = Config::from_env();

    let api = Arc::new(RestClient::new(config.client_config()));
    let mut session = Session::open(&config, api).await?;
    commands::execute(command, &mut session, &config).await
}

/// User-facing message; login problems and connectivity problems read differently
fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<Error>() {
        Some(Error::Authentication(reason)) => {
            format!("Login rejected: {}", reason)
        }
        Some(Error::Validation(reason)) => format!("Registration rejected: {}", reason),
        Some(Error::Transport(reason)) => format!(
            "Could not reach the server: {}\nLocal changes are kept and will be sent on the next sync.",
            reason
        ),
        Some(Error::PendingChanges) => {
            "There are local changes the server has not seen.\nRun `deck sync` first, or `deck pull --force` to discard them.".to_string()
        }
        Some(Error::SyncTimedOut { seconds }) => format!(
            "Sync gave up after {} seconds; local changes are kept.",
            seconds
        ),
        _ => format!("Error: {:#}", err),
    }
}
