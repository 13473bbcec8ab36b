//! cgmsync - fetch and watch glucose readings from Nightscout or LibreLinkUp.

mod cli;
mod commands;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cgmsync_core::Config;

use cli::{Cli, Commands};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). With a log directory,
/// records also go to a daily rotating file; keep the returned guard alive
/// until exit so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = fmt::layer().with_writer(io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cgmsync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(stderr)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr).with(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!("cgmsync starting");

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env();

    match cli.command {
        Commands::Login { service } => {
            let backend = service.resolve(config.service);
            commands::login::login(&mut config, backend).await
        }
        Commands::Logout { service } => commands::login::logout(&mut config, service).await,
        Commands::Fetch {
            service,
            limit,
            json,
        } => {
            let backend = service.resolve(config.service);
            commands::sync::fetch(&mut config, backend, limit, json).await
        }
        Commands::Watch { service } => {
            let backend = service.resolve(config.service);
            commands::sync::watch(&mut config, backend).await
        }
        Commands::History {
            service,
            limit,
            json,
        } => {
            let backend = service.resolve(config.service);
            commands::info::history(&config, backend, limit, json).await
        }
        Commands::Toggle => commands::info::toggle(&mut config),
        Commands::Status => commands::info::status(&config),
    }
}
