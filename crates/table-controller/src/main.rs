//! Table controller entry point.
//!
//! One process drives one physical table.  It reads the table's identity,
//! device transport and Studio endpoint from a TOML file, then runs until it
//! is stopped by Ctrl-C / SIGTERM, a `stop` command from the Studio, or a
//! fault it cannot recover from.
//!
//! # Usage
//!
//! ```text
//! table-controller --config /etc/table-controller/rl-01.toml
//!
//! Options:
//!   -c, --config <PATH>       configuration file [env: TABLE_CONFIG]
//!       --log-level <LEVEL>   overrides [table] log_level (RUST_LOG wins over both)
//! ```
//!
//! # Exit codes
//!
//! | Code | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0    | stopped on request, cleanup succeeded                       |
//! | 1    | the controller could not start (device missing)             |
//! | 2    | stopped by a fault (error or restart budget, failed cleanup) |
//! | 3    | configuration could not be loaded                           |

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use table_controller::application::supervisor::Supervisor;
use table_controller::infrastructure::storage::load_config;

/// Exit code for an unreadable or invalid configuration.
const EXIT_BAD_CONFIG: i32 = 3;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Casino table hardware controller.
#[derive(Debug, Parser)]
#[command(
    name = "table-controller",
    about = "Drives a roulette wheel, dice shaker or card scanner and reports to the Studio",
    version
)]
struct Cli {
    /// Path of the table's TOML configuration file.
    #[arg(short, long, env = "TABLE_CONFIG")]
    config: PathBuf,

    /// Log level used when `RUST_LOG` is not set.  Defaults to the
    /// configuration's `[table] log_level`.
    #[arg(long, env = "TABLE_LOG_LEVEL")]
    log_level: Option<String>,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli.config)
        .with_context(|| format!("cannot load {}", cli.config.display()))
    {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet; the level comes from the file.
            init_tracing(cli.log_level.as_deref().unwrap_or("info"));
            error!("{e:#}");
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    init_tracing(cli.log_level.as_deref().unwrap_or(&config.table.log_level));
    info!(
        table_id = %config.table.table_id,
        config = %cli.config.display(),
        "table controller starting"
    );

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        shutdown_tx.send_replace(true);
    });

    let status = Supervisor::new(config).run(shutdown_rx).await;
    std::process::exit(status.code());
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "cannot listen for SIGTERM; only Ctrl-C stops the controller");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
