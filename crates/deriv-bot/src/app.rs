//! Application wiring: session, trader and shutdown.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use deriv_risk::{RiskLedger, SystemClock};
use deriv_signal::SignalEngine;
use deriv_telemetry::Metrics;
use deriv_trader::{DynOrderGateway, RunSummary, Trader, WsOrderGateway};
use deriv_ws::{
    Connector, ConnectionManager, LiveConnector, SessionState, SessionView, SimHandle,
    SimulatedConnector,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    connection: Arc<ConnectionManager>,
    sim: Option<SimHandle>,
}

impl Application {
    /// Validate `config` and pick the live or simulated connector.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        if config.simulation {
            let connector = SimulatedConnector::new(config.sim_config());
            let handle = connector.handle();
            info!(
                seed = config.sim.seed,
                tick_interval_ms = config.sim.tick_interval_ms,
                "Simulation mode, no venue connection will be made"
            );
            Ok(Self::assemble(config, Arc::new(connector), Some(handle)))
        } else {
            deriv_ws::init_crypto();
            let connector =
                LiveConnector::new(Duration::from_millis(config.connection.connect_timeout_ms));
            Ok(Self::assemble(config, Arc::new(connector), None))
        }
    }

    /// Same as [`Application::new`] over a caller-supplied connector.
    pub fn with_connector(config: AppConfig, connector: Arc<dyn Connector>) -> AppResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, connector, None))
    }

    fn assemble(config: AppConfig, connector: Arc<dyn Connector>, sim: Option<SimHandle>) -> Self {
        let connection = Arc::new(ConnectionManager::new(config.connection_config(), connector));
        Self {
            config,
            connection,
            sim,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Control handle of the simulated venue, in simulation mode.
    pub fn sim(&self) -> Option<&SimHandle> {
        self.sim.as_ref()
    }

    fn build_trader(&self) -> AppResult<Trader> {
        let engine = SignalEngine::new(self.config.signal)?;
        let risk = RiskLedger::new(self.config.risk.clone(), Arc::new(SystemClock))?;
        let gateway: DynOrderGateway = Arc::new(WsOrderGateway::new(self.connection.clone()));
        Ok(Trader::new(self.config.trader.clone(), engine, risk, gateway)?)
    }

    /// Run until SIGINT/SIGTERM or a fatal session error.
    pub async fn run(self) -> AppResult<RunSummary> {
        let shutdown = CancellationToken::new();
        let signals = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                match wait_for_shutdown().await {
                    Ok(()) => shutdown.cancel(),
                    Err(e) => warn!(error = %e, "Signal handlers unavailable"),
                }
            }
        });

        let result = self.run_until(shutdown).await;
        signals.abort();
        result
    }

    /// Run until `shutdown` is cancelled or the session dies.
    pub async fn run_until(self, shutdown: CancellationToken) -> AppResult<RunSummary> {
        info!(
            simulation = self.config.simulation,
            account = %self.config.account_type,
            symbol = %self.config.trader.symbol,
            "Starting application"
        );

        let session = self.connection.connect().await?;
        if let Some(account) = session.account() {
            info!(
                login_id = %account.login_id,
                currency = %account.currency,
                balance = %account.balance,
                is_virtual = account.is_virtual,
                "Account ready"
            );
        }
        let watcher = tokio::spawn(watch_session(session.clone(), self.connection.clone()));

        let result = self.trade(&session, shutdown).await;

        watcher.abort();
        self.connection.disconnect().await;
        Metrics::session_state_set(self.connection.state().as_str());
        result
    }

    async fn trade(&self, session: &SessionView, shutdown: CancellationToken) -> AppResult<RunSummary> {
        let mut trader = self.build_trader()?;
        trader.start().await?;

        let stop = CancellationToken::new();
        let mut run = tokio::spawn(trader.run(stop.clone()));

        let finished = tokio::select! {
            joined = &mut run => Some(joined),
            () = shutdown.cancelled() => {
                info!("Shutdown requested, no new orders");
                None
            }
            Some(report) = session.wait_fatal() => {
                error!(%report, "Session failed, halting trading");
                run.abort();
                return Err(AppError::Fatal(report));
            }
        };

        let joined = match finished {
            Some(joined) => joined,
            None => {
                stop.cancel();
                run.await
            }
        };

        match joined.map_err(|e| AppError::Task(e.to_string()))? {
            Ok(summary) => {
                info!(
                    unsettled = summary.unsettled,
                    balance = ?summary.balance.map(|b| b.to_string()),
                    "Trading stopped"
                );
                info!("{}", summary.stats);
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Trader stopped with an error");
                Err(match session.fatal() {
                    Some(report) => AppError::Fatal(report),
                    None => e.into(),
                })
            }
        }
    }
}

/// Mirror session transitions into the metrics registry.
async fn watch_session(session: SessionView, connection: Arc<ConnectionManager>) {
    let mut states = session.state_changes();
    let mut previous = *states.borrow_and_update();
    Metrics::session_state_set(previous.as_str());

    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        Metrics::session_state_set(state.as_str());
        if state == SessionState::Reconnecting && previous == SessionState::Ready {
            Metrics::reconnect("link_lost");
        }
        Metrics::request_timeouts_observed(connection.stats().request_timeouts_total);
        previous = state;
    }
}

/// Wait for SIGINT or SIGTERM (Ctrl+C elsewhere).
async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
