//! Trade orchestrator.
//!
//! A single worker consumes every stream event (prices and contract
//! updates) in arrival order and processes each to completion before the
//! next:
//!
//! 1. Price sample -> signal engine
//! 2. Signal above threshold -> stake sizing -> trade validation -> risk approval
//! 3. Approved -> Pending position -> quote and buy through the gateway
//! 4. Confirmed -> Open, contract watched; failed -> Rejected, reservation released
//! 5. Sold update -> Settled, P&L booked in the risk ledger
//!
//! Because the worker is the only mutator of the ledger and the book, no
//! two orders are ever approved against a stale count.

use std::sync::Arc;

use deriv_core::{Money, Position, PriceSample, Signal, Symbol};
use deriv_risk::{DailyStats, RiskLedger};
use deriv_signal::SignalEngine;
use deriv_telemetry::Metrics;
use deriv_ws::{api_error_hint, ContractUpdate, StreamEvent, StreamPayload, Subscriber, WsError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::book::PositionBook;
use crate::config::{FeedKind, TraderConfig};
use crate::error::{TraderError, TraderResult};
use crate::gateway::{DynOrderGateway, PriceFeed};
use crate::order::OrderRequest;

/// Outcome of a trading run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: DailyStats,
    /// Positions still open when the drain timed out.
    pub unsettled: usize,
    pub balance: Option<Money>,
}

pub struct Trader {
    config: TraderConfig,
    symbol: Symbol,
    engine: SignalEngine,
    risk: RiskLedger,
    book: PositionBook,
    gateway: DynOrderGateway,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: mpsc::UnboundedReceiver<StreamEvent>,
    /// Contracts whose status stream could not be opened yet.
    unwatched: Vec<u64>,
    balance: Option<Money>,
    draining: bool,
}

impl Trader {
    pub fn new(
        config: TraderConfig,
        engine: SignalEngine,
        risk: RiskLedger,
        gateway: DynOrderGateway,
    ) -> TraderResult<Self> {
        config.validate()?;
        let symbol = config.symbol()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            symbol,
            engine,
            risk,
            book: PositionBook::new(),
            gateway,
            events_tx,
            events_rx,
            unwatched: Vec::new(),
            balance: None,
            draining: false,
        })
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    pub fn engine(&self) -> &SignalEngine {
        &self.engine
    }

    pub fn risk(&self) -> &RiskLedger {
        &self.risk
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn balance(&self) -> Option<Money> {
        self.balance
    }

    /// Handle that queues events for this worker.
    pub fn subscriber(&self) -> Arc<dyn Subscriber> {
        Arc::new(self.events_tx.clone())
    }

    pub fn feed(&self) -> PriceFeed {
        PriceFeed {
            symbol: self.symbol.clone(),
            kind: self.config.feed,
            granularity: self.config.granularity,
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Read the balance, optionally warm up from history, then subscribe to
    /// the price feed.
    pub async fn start(&mut self) -> TraderResult<()> {
        self.refresh_balance().await?;

        if self.config.warmup_from_history {
            let count = self.engine.config().long_period;
            match self.gateway.price_history(self.feed(), count).await {
                Ok(samples) => {
                    self.engine.warm_up(&samples);
                    info!(
                        symbol = %self.symbol,
                        samples = samples.len(),
                        buffered = self.engine.buffered(&self.symbol),
                        "Warmed up from history"
                    );
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(error = %e, "History unavailable, warming up from the live feed"),
            }
        }

        self.gateway
            .subscribe_prices(self.feed(), self.subscriber())
            .await?;
        info!(
            symbol = %self.symbol,
            feed = self.config.feed.as_str(),
            threshold = self.config.signal_threshold,
            stake = %self.config.stake,
            "Trader started"
        );
        Ok(())
    }

    /// Process events until `shutdown` fires, then drain open positions.
    ///
    /// Returns early with the error if the session fails fatally.
    pub async fn run(mut self, shutdown: CancellationToken) -> TraderResult<RunSummary> {
        let result: TraderResult<()> = loop {
            let event = tokio::select! {
                biased;

                () = shutdown.cancelled() => break Ok(()),
                event = self.events_rx.recv() => event,
            };
            let Some(event) = event else {
                break Ok(());
            };
            if let Err(e) = self.handle_event(event).await {
                if e.is_fatal() {
                    break Err(e);
                }
                warn!(error = %e, "Event handling failed");
            }
        };

        if let Err(e) = result {
            error!(error = %e, open = self.book.len(), "Trading stopped");
            return Err(e);
        }

        self.drain().await;
        let summary = RunSummary {
            stats: self.risk.stats().clone(),
            unsettled: self.book.len(),
            balance: self.balance,
        };
        info!(
            stats = %summary.stats,
            unsettled = summary.unsettled,
            "Trading loop stopped"
        );
        Ok(summary)
    }

    /// Process every event already queued. Returns how many were handled.
    pub async fn pump(&mut self) -> TraderResult<usize> {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Stop opening positions and wait for open ones to settle, up to the
    /// configured timeout.
    async fn drain(&mut self) {
        self.draining = true;
        if self.book.is_empty() {
            return;
        }
        let timeout = self.config.shutdown_drain_timeout();
        info!(
            open = self.book.len(),
            timeout_secs = timeout.as_secs(),
            "Draining open positions"
        );
        if tokio::time::timeout(timeout, self.settle_remaining())
            .await
            .is_err()
        {
            warn!(
                unsettled = self.book.len(),
                contracts = ?self.book.open_contracts(),
                "Drain timed out with open positions"
            );
        }
    }

    async fn settle_remaining(&mut self) {
        while !self.book.is_empty() {
            if let Err(e) = self.retry_watches().await {
                warn!(error = %e, "Cannot watch open contracts");
                return;
            }
            let Some(event) = self.events_rx.recv().await else {
                return;
            };
            if let StreamPayload::Contract(update) = event.payload {
                if let Err(e) = self.on_contract_update(update).await {
                    warn!(error = %e, "Settlement handling failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------------

    pub async fn handle_event(&mut self, event: StreamEvent) -> TraderResult<()> {
        trace!(key = %event.key, seq = event.seq, "Event");
        match event.payload {
            StreamPayload::Tick(tick) if self.config.feed == FeedKind::Ticks => {
                self.on_price(&tick.symbol, tick.epoch, tick.quote).await
            }
            StreamPayload::Candle(candle) if self.config.feed == FeedKind::Candles => {
                self.on_price(&candle.symbol, candle.open_time, candle.close)
                    .await
            }
            StreamPayload::Contract(update) => self.on_contract_update(update).await,
            _ => Ok(()),
        }
    }

    async fn on_price(&mut self, symbol: &str, epoch: i64, price: f64) -> TraderResult<()> {
        if symbol != self.symbol.as_str() {
            trace!(symbol, "Price for another instrument ignored");
            return Ok(());
        }
        self.retry_watches().await?;

        let sample = PriceSample::from_epoch(self.symbol.clone(), epoch, price);
        let Some(signal) = self.engine.on_sample(&sample) else {
            return Ok(());
        };
        if signal.direction.is_actionable() {
            Metrics::signal_emitted(self.symbol.as_str(), signal.direction.as_str());
        }
        if !signal.passes(self.config.signal_threshold) {
            trace!(
                direction = %signal.direction,
                strength = signal.strength,
                threshold = self.config.signal_threshold,
                "Signal below threshold"
            );
            return Ok(());
        }
        if self.draining {
            debug!("Draining, signal ignored");
            return Ok(());
        }
        self.execute(&signal).await
    }

    async fn execute(&mut self, signal: &Signal) -> TraderResult<()> {
        if self.risk.config().max_concurrent_trades == 1 && self.book.has_active(&signal.symbol) {
            debug!(symbol = %signal.symbol, "Position already active, signal skipped");
            return Ok(());
        }

        let stake = self.config.sizing.stake(self.config.stake, self.balance);
        let order = match OrderRequest::for_signal(signal, stake, &self.config) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Trade skipped");
                return Ok(());
            }
        };

        if let Err(reason) = self.risk.try_approve(stake) {
            Metrics::risk_blocked(reason.as_str());
            info!(%reason, %stake, "Trade blocked by risk limits");
            return Ok(());
        }

        let position_id = self.book.insert(Position::pending(
            order.symbol.clone(),
            order.contract_type,
            stake,
        ));
        Metrics::open_positions(self.book.len() as i64);
        info!(
            symbol = %order.symbol,
            contract_type = %order.contract_type,
            %stake,
            strength = signal.strength,
            "Placing order"
        );

        match self.gateway.place(order).await {
            Ok(receipt) => {
                self.book.confirm(&position_id, receipt.contract_id)?;
                self.risk.on_order_confirmed();
                Metrics::order_event(self.symbol.as_str(), "placed");
                if let Some(balance) = receipt.balance_after {
                    self.set_balance(balance);
                }
                info!(
                    contract_id = receipt.contract_id,
                    buy_price = %receipt.buy_price,
                    trades_today = self.risk.state().trade_count,
                    "Order confirmed"
                );
                self.watch(receipt.contract_id).await
            }
            Err(e) => {
                self.book.reject(&position_id)?;
                self.risk.on_order_rejected(stake)?;
                Metrics::order_event(self.symbol.as_str(), "rejected");
                Metrics::open_positions(self.book.len() as i64);
                if e.is_fatal() {
                    error!(error = %e, "Order failed, session lost");
                    return Err(e.into());
                }
                let hint = match &e {
                    WsError::Api { code, .. } => api_error_hint(code),
                    _ => "",
                };
                warn!(error = %e, hint, "Order rejected");
                Ok(())
            }
        }
    }

    async fn watch(&mut self, contract_id: u64) -> TraderResult<()> {
        match self.gateway.watch(contract_id, self.subscriber()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(contract_id, error = %e, "Cannot watch contract yet, will retry");
                self.unwatched.push(contract_id);
                Ok(())
            }
        }
    }

    async fn retry_watches(&mut self) -> TraderResult<()> {
        for contract_id in std::mem::take(&mut self.unwatched) {
            if self.book.by_contract(contract_id).is_some() {
                self.watch(contract_id).await?;
            }
        }
        Ok(())
    }

    async fn on_contract_update(&mut self, update: ContractUpdate) -> TraderResult<()> {
        let Some(position) = self.book.by_contract(update.contract_id) else {
            trace!(contract_id = update.contract_id, "Update for untracked contract");
            return Ok(());
        };
        let stake = position.stake;

        if let Some(balance) = update.balance_after.and_then(|b| Money::from_f64(b).ok()) {
            self.set_balance(balance);
        }
        if !update.is_sold {
            debug!(
                contract_id = update.contract_id,
                profit = ?update.profit,
                "Contract update"
            );
            return Ok(());
        }

        let profit = match update.profit.map(Money::from_f64) {
            Some(Ok(profit)) => profit.round_cents(),
            _ => {
                warn!(
                    contract_id = update.contract_id,
                    "Sold update without a usable profit, booking a full loss"
                );
                -stake
            }
        };

        if self.book.settle(update.contract_id, profit)?.is_none() {
            return Ok(());
        }
        self.risk.record(stake, profit)?;

        let outcome = if profit.is_positive() { "won" } else { "lost" };
        Metrics::order_event(self.symbol.as_str(), outcome);
        Metrics::daily_pnl(self.risk.state().realized_pnl.to_f64());
        Metrics::open_positions(self.book.len() as i64);
        info!(
            contract_id = update.contract_id,
            %profit,
            status = update.status.as_deref().unwrap_or(outcome),
            "Position settled"
        );

        self.gateway.release(update.contract_id).await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Balance
    // ------------------------------------------------------------------------

    async fn refresh_balance(&mut self) -> TraderResult<()> {
        match self.gateway.balance().await {
            Ok(balance) => {
                self.set_balance(balance);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(TraderError::Session(e)),
            Err(e) => {
                warn!(error = %e, "Balance unavailable");
                Ok(())
            }
        }
    }

    fn set_balance(&mut self, balance: Money) {
        self.balance = Some(balance);
        Metrics::account_balance(balance.to_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StakeSizing;
    use crate::gateway::MockOrderGateway;
    use chrono::NaiveDate;
    use deriv_core::ContractType;
    use deriv_risk::{ManualClock, RiskConfig};
    use deriv_signal::SignalConfig;
    use rust_decimal_macros::dec;

    const EPOCH: i64 = 1_700_000_000;

    fn money(v: rust_decimal::Decimal) -> Money {
        Money::new(v)
    }

    fn setup(threshold: f64, risk: RiskConfig) -> (Trader, Arc<MockOrderGateway>) {
        let config = TraderConfig {
            signal_threshold: threshold,
            ..TraderConfig::default()
        };
        setup_with(config, risk)
    }

    fn setup_with(config: TraderConfig, risk: RiskConfig) -> (Trader, Arc<MockOrderGateway>) {
        let gateway = Arc::new(MockOrderGateway::new(money(dec!(1000))));
        let clock = Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        ));
        let trader = Trader::new(
            config,
            SignalEngine::new(SignalConfig::new(5, 10, 20)).unwrap(),
            RiskLedger::new(risk, clock).unwrap(),
            gateway.clone(),
        )
        .unwrap();
        (trader, gateway)
    }

    /// `runs` of (count, price), one tick per second.
    fn push_series(gateway: &MockOrderGateway, start: i64, runs: &[(usize, f64)]) -> i64 {
        let mut epoch = start;
        for &(count, price) in runs {
            for _ in 0..count {
                assert!(gateway.push_tick(epoch, price));
                epoch += 1;
            }
        }
        epoch
    }

    #[tokio::test]
    async fn test_buy_strength_0_222_below_threshold_no_trade() {
        let (mut trader, gateway) = setup(0.5, RiskConfig::default());
        trader.start().await.unwrap();

        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        assert_eq!(trader.pump().await.unwrap(), 20);

        assert!(trader.engine().is_warm(&trader.feed().symbol));
        assert_eq!(gateway.order_count(), 0);
        assert!(trader.book().is_empty());
    }

    #[tokio::test]
    async fn test_buy_strength_0_444_below_threshold_no_trade() {
        let (mut trader, gateway) = setup(0.5, RiskConfig::default());
        trader.start().await.unwrap();

        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 70.0), (5, 130.0)]);
        trader.pump().await.unwrap();

        assert_eq!(gateway.order_count(), 0);
        assert_eq!(trader.risk().state().trade_count, 0);
    }

    #[tokio::test]
    async fn test_no_signal_during_warm_up() {
        let (mut trader, gateway) = setup(0.0, RiskConfig::default());
        trader.start().await.unwrap();

        push_series(&gateway, EPOCH, &[(10, 80.0), (9, 200.0)]);
        trader.pump().await.unwrap();
        assert_eq!(gateway.order_count(), 0);
    }

    #[tokio::test]
    async fn test_signal_places_order_and_settles() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        trader.start().await.unwrap();
        assert_eq!(trader.balance(), Some(money(dec!(1000))));

        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();

        let orders = gateway.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].contract_type, ContractType::Call);
        assert_eq!(orders[0].stake, money(dec!(10)));
        assert_eq!(trader.risk().state().trade_count, 1);
        assert_eq!(trader.book().len(), 1);
        assert!(gateway.is_watching(1000));
        assert_eq!(trader.balance(), Some(money(dec!(990))));

        assert!(gateway.settle(1000, money(dec!(9.5))));
        trader.pump().await.unwrap();

        assert!(trader.book().is_empty());
        assert_eq!(trader.risk().stats().wins, 1);
        assert_eq!(trader.risk().state().realized_pnl, money(dec!(9.5)));
        assert_eq!(trader.risk().state().open_positions, 0);
        assert_eq!(gateway.released(), vec![1000]);
        assert_eq!(trader.balance(), Some(money(dec!(1009.5))));
    }

    #[tokio::test]
    async fn test_sell_signal_places_put() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        trader.start().await.unwrap();

        // short 90 < medium 100 < long 110
        push_series(&gateway, EPOCH, &[(10, 120.0), (5, 110.0), (5, 90.0)]);
        trader.pump().await.unwrap();

        let orders = gateway.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].contract_type, ContractType::Put);
    }

    #[tokio::test]
    async fn test_active_position_blocks_second_order() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        trader.start().await.unwrap();

        let next = push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();
        assert_eq!(gateway.order_count(), 1);

        // Still a Buy above threshold, but the first position is open.
        push_series(&gateway, next, &[(1, 110.0)]);
        trader.pump().await.unwrap();
        assert_eq!(gateway.order_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_order_does_not_count() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        trader.start().await.unwrap();
        gateway.set_next_result(Err(WsError::Api {
            code: "ContractBuyValidationError".to_string(),
            message: "Stake too low".to_string(),
        }));

        let next = push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();

        assert_eq!(gateway.order_count(), 1);
        assert!(trader.book().is_empty());
        assert_eq!(trader.risk().state().trade_count, 0);
        assert_eq!(trader.risk().state().open_positions, 0);

        // The freed slot is usable on the next signal.
        push_series(&gateway, next, &[(1, 110.0)]);
        trader.pump().await.unwrap();
        assert_eq!(gateway.order_count(), 2);
        assert_eq!(trader.risk().state().trade_count, 1);
    }

    #[tokio::test]
    async fn test_daily_trade_limit_blocks() {
        let risk = RiskConfig {
            max_daily_trades: 1,
            ..RiskConfig::default()
        };
        let (mut trader, gateway) = setup(0.1, risk);
        trader.start().await.unwrap();

        let next = push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();
        gateway.settle(1000, money(dec!(-10)));
        trader.pump().await.unwrap();
        assert!(trader.book().is_empty());

        push_series(&gateway, next, &[(1, 110.0)]);
        trader.pump().await.unwrap();
        assert_eq!(gateway.order_count(), 1);
        assert_eq!(trader.risk().stats().losses, 1);
    }

    #[tokio::test]
    async fn test_fatal_order_error_stops() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        trader.start().await.unwrap();
        gateway.set_next_result(Err(WsError::ConnectionLost { attempts: 5 }));

        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        let err = trader.pump().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(trader.risk().state().open_positions, 0);
    }

    #[tokio::test]
    async fn test_watch_retried_on_next_price() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        trader.start().await.unwrap();
        gateway.set_fail_watch(true);

        let next = push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();
        assert!(!gateway.is_watching(1000));

        gateway.set_fail_watch(false);
        push_series(&gateway, next, &[(1, 110.0)]);
        trader.pump().await.unwrap();
        assert!(gateway.is_watching(1000));
    }

    #[tokio::test]
    async fn test_balance_percent_sizing() {
        let config = TraderConfig {
            signal_threshold: 0.1,
            sizing: StakeSizing::BalancePercent { risk_pct: dec!(0.5) },
            ..TraderConfig::default()
        };
        let (mut trader, gateway) = setup_with(config, RiskConfig::default());
        trader.start().await.unwrap();

        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();

        // 0.5% of 1000
        assert_eq!(gateway.orders()[0].stake, money(dec!(5)));
    }

    #[tokio::test]
    async fn test_warm_up_from_history() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        let symbol = trader.feed().symbol;
        let history: Vec<PriceSample> = (0..19)
            .map(|i| PriceSample::from_epoch(symbol.clone(), EPOCH + i, 100.0))
            .collect();
        gateway.set_history(history);

        trader.start().await.unwrap();
        assert_eq!(trader.engine().buffered(&symbol), 19);
        assert_eq!(gateway.order_count(), 0);

        // One live tick completes the window; 100 x 19 then 100 is flat.
        gateway.push_tick(EPOCH + 19, 100.0);
        trader.pump().await.unwrap();
        assert!(trader.engine().is_warm(&symbol));
        assert_eq!(gateway.order_count(), 0);
    }

    #[tokio::test]
    async fn test_candle_feed_uses_close_prices() {
        let config = TraderConfig {
            signal_threshold: 0.1,
            feed: FeedKind::Candles,
            ..TraderConfig::default()
        };
        let (mut trader, gateway) = setup_with(config, RiskConfig::default());
        trader.start().await.unwrap();
        assert_eq!(gateway.feed().map(|f| f.kind), Some(FeedKind::Candles));

        // A forming candle replaces its own sample.
        gateway.push_tick(EPOCH, 500.0);
        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();

        assert_eq!(gateway.order_count(), 1);
        assert_eq!(gateway.orders()[0].contract_type, ContractType::Call);
    }

    #[tokio::test]
    async fn test_other_instruments_ignored() {
        let (mut trader, _gateway) = setup(0.0, RiskConfig::default());
        let event = StreamEvent {
            key: deriv_ws::SubscriptionKey::new(deriv_ws::Channel::Ticks, "R_50"),
            seq: 1,
            payload: StreamPayload::Tick(deriv_ws::TickData {
                symbol: "R_50".to_string(),
                quote: 10.0,
                epoch: EPOCH,
            }),
        };
        trader.handle_event(event).await.unwrap();
        assert_eq!(trader.engine().buffered(&trader.feed().symbol), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_open_position() {
        let (mut trader, gateway) = setup(0.1, RiskConfig::default());
        trader.start().await.unwrap();
        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();
        assert_eq!(trader.book().len(), 1);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let handle = tokio::spawn(trader.run(shutdown));

        gateway.settle(1000, money(dec!(-10)));
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.unsettled, 0);
        assert_eq!(summary.stats.total_trades, 1);
        assert_eq!(summary.stats.total_profit, money(dec!(-10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drain_times_out() {
        let config = TraderConfig {
            signal_threshold: 0.1,
            shutdown_drain_timeout_secs: 5,
            ..TraderConfig::default()
        };
        let (mut trader, gateway) = setup_with(config, RiskConfig::default());
        trader.start().await.unwrap();
        push_series(&gateway, EPOCH, &[(10, 80.0), (5, 90.0), (5, 110.0)]);
        trader.pump().await.unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let summary = trader.run(shutdown).await.unwrap();
        assert_eq!(summary.unsettled, 1);
        assert_eq!(summary.stats.total_trades, 0);
    }
}
