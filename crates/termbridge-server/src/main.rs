//! termbridge: one interactive shell per WebSocket connection.
//!
//! Each client that connects gets its own PTY-backed shell. Input is checked
//! against an advisory denylist before it reaches the shell; output streams
//! back untouched. Closing either end tears down the other.

mod cli;

use std::process::ExitCode;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use termbridge_config::{config_to_json, BridgeConfig};
use termbridge_server::SessionServer;

const DEFAULT_LOG_DIRECTIVE: &str = "termbridge=info";

/// `RUST_LOG` wins, then `--log-level`, then `logging.level`.
fn init_logging(args: &cli::Args, config: &BridgeConfig) {
    let directive = args
        .log_level
        .as_deref()
        .unwrap_or(config.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = match termbridge_config::load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("termbridge: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut config = loaded.config;
    args.apply(&mut config);
    if let Err(e) = termbridge_config::validation::validate(&config) {
        eprintln!("termbridge: {e}");
        return ExitCode::FAILURE;
    }

    init_logging(&args, &config);
    for note in &loaded.ignored_overrides {
        tracing::warn!("{note}");
    }
    tracing::debug!(config = %config_to_json(&config), "Effective configuration");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(serve(&config));

    // Dropping the runtime drops every session, which signals its shell.
    drop(runtime);
    if !termbridge_shell::wait_for_pending_kills(termbridge_shell::KILL_GRACE + Duration::from_secs(1)) {
        tracing::warn!("Some shells may still be running");
    }

    code
}

async fn serve(config: &BridgeConfig) -> ExitCode {
    let server = match SessionServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start server");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return ExitCode::FAILURE;
            }
            tracing::info!("Shutting down");
        }
    }

    ExitCode::SUCCESS
}
