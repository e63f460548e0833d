//! Venue access for the orchestrator.
//!
//! [`OrderGateway`] is the seam between the trading loop and the session:
//! - `WsOrderGateway` drives a [`ConnectionManager`] (live or simulated)
//! - `MockOrderGateway` records calls and lets tests inject prices and
//!   settlements

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use deriv_core::{Money, PriceSample, Symbol};
use deriv_ws::{
    BoxFuture, BuyReceipt, CandleData, Channel, ConnectionManager, ContractUpdate, ProposalQuote,
    StreamEvent, StreamPayload, Subscriber, SubscriptionKey, TickData, WsError, WsRequest,
    WsResult,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::FeedKind;
use crate::order::{OrderReceipt, OrderRequest};

// ============================================================================
// PriceFeed
// ============================================================================

/// The market data stream feeding the signal engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceFeed {
    pub symbol: Symbol,
    pub kind: FeedKind,
    /// Candle width in seconds. Ignored for ticks.
    pub granularity: u32,
}

impl PriceFeed {
    pub fn key(&self) -> SubscriptionKey {
        let channel = match self.kind {
            FeedKind::Ticks => Channel::Ticks,
            FeedKind::Candles => Channel::Candles,
        };
        SubscriptionKey::new(channel, self.symbol.as_str())
    }
}

fn contract_key(contract_id: u64) -> SubscriptionKey {
    SubscriptionKey::new(Channel::Contract, contract_id.to_string())
}

fn money(value: f64, field: &str) -> WsResult<Money> {
    Money::from_f64(value).map_err(|e| WsError::Validation(format!("{field}: {e}")))
}

// ============================================================================
// OrderGateway
// ============================================================================

pub trait OrderGateway: Send + Sync {
    /// Start streaming `feed` to `subscriber`. History carried by the
    /// subscription acknowledgement is delivered first.
    fn subscribe_prices(
        &self,
        feed: PriceFeed,
        subscriber: Arc<dyn Subscriber>,
    ) -> BoxFuture<'_, WsResult<()>>;

    /// The latest `count` samples of `feed`, oldest first.
    fn price_history(&self, feed: PriceFeed, count: usize)
        -> BoxFuture<'_, WsResult<Vec<PriceSample>>>;

    fn balance(&self) -> BoxFuture<'_, WsResult<Money>>;

    /// Quote and buy. Returns once the venue confirmed the contract.
    fn place(&self, order: OrderRequest) -> BoxFuture<'_, WsResult<OrderReceipt>>;

    /// Stream status updates for a bought contract to `subscriber`.
    fn watch(&self, contract_id: u64, subscriber: Arc<dyn Subscriber>)
        -> BoxFuture<'_, WsResult<()>>;

    /// Stop watching a settled contract.
    fn release(&self, contract_id: u64) -> BoxFuture<'_, ()>;
}

pub type DynOrderGateway = Arc<dyn OrderGateway>;

// ============================================================================
// WsOrderGateway
// ============================================================================

/// Gateway over a WebSocket session.
pub struct WsOrderGateway {
    conn: Arc<ConnectionManager>,
}

impl WsOrderGateway {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self { conn }
    }
}

impl OrderGateway for WsOrderGateway {
    fn subscribe_prices(
        &self,
        feed: PriceFeed,
        subscriber: Arc<dyn Subscriber>,
    ) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            let request = match feed.kind {
                FeedKind::Ticks => WsRequest::ticks(feed.symbol.as_str()),
                FeedKind::Candles => WsRequest::candles(feed.symbol.as_str(), feed.granularity, 1),
            };
            self.conn.subscribe(feed.key(), request, subscriber).await?;
            Ok(())
        })
    }

    fn price_history(
        &self,
        feed: PriceFeed,
        count: usize,
    ) -> BoxFuture<'_, WsResult<Vec<PriceSample>>> {
        Box::pin(async move {
            let symbol = feed.symbol;
            match feed.kind {
                FeedKind::Ticks => {
                    let body = self
                        .conn
                        .request(WsRequest::tick_history(symbol.as_str(), count))
                        .await?;
                    Ok(TickData::from_history(&body)
                        .into_iter()
                        .map(|t| PriceSample::from_epoch(symbol.clone(), t.epoch, t.quote))
                        .collect())
                }
                FeedKind::Candles => {
                    let request = WsRequest::from_value(json!({
                        "ticks_history": symbol.as_str(),
                        "style": "candles",
                        "granularity": feed.granularity,
                        "count": count,
                        "end": "latest",
                    }))?;
                    let body = self.conn.request(request).await?;
                    Ok(CandleData::from_candles(&body)
                        .into_iter()
                        .map(|c| PriceSample::from_epoch(symbol.clone(), c.open_time, c.close))
                        .collect())
                }
            }
        })
    }

    fn balance(&self) -> BoxFuture<'_, WsResult<Money>> {
        Box::pin(async move {
            let body = self.conn.request(WsRequest::balance()).await?;
            let value = body
                .pointer("/balance/balance")
                .and_then(Value::as_f64)
                .ok_or_else(|| WsError::Validation("balance reply without balance".into()))?;
            money(value, "balance")
        })
    }

    fn place(&self, order: OrderRequest) -> BoxFuture<'_, WsResult<OrderReceipt>> {
        Box::pin(async move {
            let body = self
                .conn
                .request(WsRequest::proposal(&order.proposal_params()))
                .await?;
            let quote = ProposalQuote::from_body(&body)?;
            debug!(
                proposal_id = %quote.id,
                ask_price = quote.ask_price,
                payout = quote.payout,
                "Proposal received"
            );

            let body = self
                .conn
                .request(WsRequest::buy(&quote.id, quote.ask_price))
                .await?;
            let receipt = BuyReceipt::from_body(&body)?;
            Ok(OrderReceipt {
                contract_id: receipt.contract_id,
                buy_price: money(receipt.buy_price, "buy_price")?,
                balance_after: receipt
                    .balance_after
                    .map(|b| money(b, "balance_after"))
                    .transpose()?,
            })
        })
    }

    fn watch(
        &self,
        contract_id: u64,
        subscriber: Arc<dyn Subscriber>,
    ) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            self.conn
                .subscribe(
                    contract_key(contract_id),
                    WsRequest::open_contract(contract_id),
                    subscriber,
                )
                .await?;
            Ok(())
        })
    }

    fn release(&self, contract_id: u64) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.conn.unsubscribe(&contract_key(contract_id)).await {
                debug!(contract_id, error = %e, "Release failed");
            }
        })
    }
}

// ============================================================================
// MockOrderGateway
// ============================================================================

/// Recording gateway for tests.
///
/// Orders succeed with increasing contract ids unless a result is queued
/// with [`set_next_result`](Self::set_next_result).
pub struct MockOrderGateway {
    orders: Mutex<Vec<OrderRequest>>,
    next_result: Mutex<Option<WsResult<OrderReceipt>>>,
    next_contract_id: AtomicU64,
    balance: Mutex<Money>,
    history: Mutex<Vec<PriceSample>>,
    feed: Mutex<Option<(PriceFeed, Arc<dyn Subscriber>)>>,
    contracts: Mutex<HashMap<u64, Arc<dyn Subscriber>>>,
    stakes: Mutex<HashMap<u64, Money>>,
    released: Mutex<Vec<u64>>,
    fail_watch: AtomicBool,
    seq: AtomicU64,
}

impl MockOrderGateway {
    pub fn new(balance: Money) -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            next_result: Mutex::new(None),
            next_contract_id: AtomicU64::new(1000),
            balance: Mutex::new(balance),
            history: Mutex::new(Vec::new()),
            feed: Mutex::new(None),
            contracts: Mutex::new(HashMap::new()),
            stakes: Mutex::new(HashMap::new()),
            released: Mutex::new(Vec::new()),
            fail_watch: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        }
    }

    /// Outcome of the next `place` call.
    pub fn set_next_result(&self, result: WsResult<OrderReceipt>) {
        *self.next_result.lock() = Some(result);
    }

    pub fn set_history(&self, samples: Vec<PriceSample>) {
        *self.history.lock() = samples;
    }

    pub fn set_fail_watch(&self, fail: bool) {
        self.fail_watch.store(fail, Ordering::SeqCst);
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_watching(&self, contract_id: u64) -> bool {
        self.contracts.lock().contains_key(&contract_id)
    }

    pub fn released(&self) -> Vec<u64> {
        self.released.lock().clone()
    }

    pub fn feed(&self) -> Option<PriceFeed> {
        self.feed.lock().as_ref().map(|(feed, _)| feed.clone())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Deliver a tick to the price subscriber. Returns false if none.
    pub fn push_tick(&self, epoch: i64, quote: f64) -> bool {
        let Some((feed, subscriber)) = self.feed.lock().clone() else {
            return false;
        };
        let payload = match feed.kind {
            FeedKind::Ticks => StreamPayload::Tick(TickData {
                symbol: feed.symbol.to_string(),
                quote,
                epoch,
            }),
            FeedKind::Candles => StreamPayload::Candle(CandleData {
                symbol: feed.symbol.to_string(),
                open_time: epoch,
                close: quote,
            }),
        };
        subscriber.deliver(StreamEvent {
            key: feed.key(),
            seq: self.next_seq(),
            payload,
        });
        true
    }

    /// Deliver a sold update for a watched contract. Returns false if the
    /// contract is not watched.
    pub fn settle(&self, contract_id: u64, profit: Money) -> bool {
        let Some(subscriber) = self.contracts.lock().get(&contract_id).cloned() else {
            return false;
        };
        let balance_after = {
            let mut balance = self.balance.lock();
            if profit.is_positive() {
                *balance += self.stake_of(contract_id) + profit;
            }
            *balance
        };
        subscriber.deliver(StreamEvent {
            key: contract_key(contract_id),
            seq: self.next_seq(),
            payload: StreamPayload::Contract(ContractUpdate {
                contract_id,
                is_sold: true,
                profit: Some(profit.to_f64()),
                balance_after: Some(balance_after.to_f64()),
                status: Some(if profit.is_positive() { "won" } else { "lost" }.to_string()),
            }),
        });
        true
    }

    fn stake_of(&self, contract_id: u64) -> Money {
        self.stakes
            .lock()
            .get(&contract_id)
            .copied()
            .unwrap_or(Money::ZERO)
    }
}

impl OrderGateway for MockOrderGateway {
    fn subscribe_prices(
        &self,
        feed: PriceFeed,
        subscriber: Arc<dyn Subscriber>,
    ) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            let mut slot = self.feed.lock();
            if slot.is_some() {
                return Err(WsError::DuplicateSubscription(feed.key().to_string()));
            }
            *slot = Some((feed, subscriber));
            Ok(())
        })
    }

    fn price_history(
        &self,
        _feed: PriceFeed,
        count: usize,
    ) -> BoxFuture<'_, WsResult<Vec<PriceSample>>> {
        Box::pin(async move {
            let history = self.history.lock();
            let skip = history.len().saturating_sub(count);
            Ok(history[skip..].to_vec())
        })
    }

    fn balance(&self) -> BoxFuture<'_, WsResult<Money>> {
        Box::pin(async move { Ok(*self.balance.lock()) })
    }

    fn place(&self, order: OrderRequest) -> BoxFuture<'_, WsResult<OrderReceipt>> {
        Box::pin(async move {
            let stake = order.stake;
            self.orders.lock().push(order);
            if let Some(result) = self.next_result.lock().take() {
                return result;
            }
            let contract_id = self.next_contract_id.fetch_add(1, Ordering::SeqCst);
            self.stakes.lock().insert(contract_id, stake);
            let balance_after = {
                let mut balance = self.balance.lock();
                *balance -= stake;
                *balance
            };
            info!(contract_id, %stake, "Mock order placed");
            Ok(OrderReceipt {
                contract_id,
                buy_price: stake,
                balance_after: Some(balance_after),
            })
        })
    }

    fn watch(
        &self,
        contract_id: u64,
        subscriber: Arc<dyn Subscriber>,
    ) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            if self.fail_watch.load(Ordering::SeqCst) {
                return Err(WsError::RequestTimeout { req_id: 0 });
            }
            self.contracts.lock().insert(contract_id, subscriber);
            Ok(())
        })
    }

    fn release(&self, contract_id: u64) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.contracts.lock().remove(&contract_id);
            self.released.lock().push(contract_id);
        })
    }
}
