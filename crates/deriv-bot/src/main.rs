//! Deriv moving-average crossover bot - Entry Point
//!
//! `run` trades until SIGINT/SIGTERM; `check` verifies connectivity and
//! exits non-zero when any step fails.

use anyhow::Result;
use clap::{Parser, Subcommand};
use deriv_bot::{check, AppConfig, Application};
use tracing::info;

/// Deriv moving-average crossover bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DERIV_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Trade until interrupted (default)
    Run,
    /// Connect, authorize, fetch a tick, ping and reconnect, then report
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Environment overrides may change the log level, so load first.
    let config = AppConfig::load(args.config)?;

    deriv_telemetry::init_logging(&config.log_level)?;

    info!("Starting Deriv Bot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        simulation = config.simulation,
        account = %config.account_type,
        symbol = %config.trader.symbol,
        "Configuration loaded"
    );

    let app = Application::new(config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let summary = app.run().await?;
            info!(
                trades = summary.stats.total_trades,
                unsettled = summary.unsettled,
                "Shutdown complete"
            );
        }
        Command::Check => {
            let report = check::run_check(&app).await;
            println!("{report}");
            if !report.passed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
