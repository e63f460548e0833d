//! Simulated venue.
//!
//! [`SimulatedConnector`] hands the connection manager in-memory links to a
//! local venue that speaks the same JSON protocol as the real API: it
//! authorizes, answers pings, streams ticks and candles from a seeded random
//! walk (or scripted prices), prices and accepts rise/fall contracts and
//! settles them after a fixed number of ticks.
//!
//! Venue state (prices, balance, contracts) outlives individual links, so
//! reconnects behave like reconnecting to the same account.

use deriv_core::{ContractType, Money};
use futures_util::{stream, SinkExt};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, PollSender};
use tracing::{debug, info};

use crate::connector::{BoxFuture, Connector, Frame, Link};
use crate::credentials::TokenDiagnostic;
use crate::error::{WsError, WsResult};

/// Simulated venue parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub seed: u64,
    pub start_price: f64,
    /// Maximum relative price move per tick.
    pub volatility: f64,
    pub tick_interval_ms: u64,
    /// Ticks between purchase and settlement.
    pub contract_ticks: u32,
    /// Profit on a winning contract as a fraction of stake.
    pub payout_ratio: Decimal,
    pub initial_balance: Money,
    pub currency: String,
    /// Prices served before the random walk takes over.
    pub script: Vec<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: 1_000.0,
            volatility: 0.001,
            tick_interval_ms: 1_000,
            contract_ticks: 5,
            payout_ratio: Decimal::new(95, 2),
            initial_balance: Money::new(Decimal::from(10_000)),
            currency: "USD".to_string(),
            script: Vec::new(),
        }
    }
}

// ============================================================================
// Venue state
// ============================================================================

#[derive(Debug, Clone)]
struct Proposal {
    symbol: String,
    contract_type: ContractType,
    stake: Money,
}

#[derive(Debug, Clone)]
struct SimContract {
    id: u64,
    symbol: String,
    contract_type: ContractType,
    stake: Money,
    entry_spot: f64,
    current_spot: f64,
    ticks_left: u32,
    outcome: Option<Outcome>,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    won: bool,
    profit: Money,
    balance_after: Money,
}

impl SimContract {
    fn to_json(&self) -> Value {
        let (is_sold, status, profit) = match self.outcome {
            Some(o) => (1, if o.won { "won" } else { "lost" }, o.profit),
            None => (0, "open", Money::ZERO),
        };
        let mut poc = json!({
            "contract_id": self.id,
            "contract_type": self.contract_type.as_str(),
            "underlying": self.symbol,
            "buy_price": self.stake.to_f64(),
            "entry_spot": self.entry_spot,
            "current_spot": self.current_spot,
            "is_sold": is_sold,
            "status": status,
            "profit": profit.to_f64(),
        });
        if let Some(o) = self.outcome {
            poc["balance_after"] = json!(o.balance_after.to_f64());
        }
        poc
    }
}

struct Venue {
    config: SimConfig,
    rng: StdRng,
    prices: HashMap<String, f64>,
    script: VecDeque<f64>,
    balance: Money,
    epoch: i64,
    next_contract_id: u64,
    next_proposal_id: u64,
    next_stream_id: u64,
    proposals: HashMap<String, Proposal>,
    contracts: HashMap<u64, SimContract>,
}

impl Venue {
    fn new(config: SimConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            script: config.script.iter().copied().collect(),
            balance: config.initial_balance,
            epoch: chrono::Utc::now().timestamp(),
            prices: HashMap::new(),
            next_contract_id: 200_000_001,
            next_proposal_id: 1,
            next_stream_id: 1,
            proposals: HashMap::new(),
            contracts: HashMap::new(),
            config,
        }
    }

    fn price(&self, symbol: &str) -> f64 {
        self.prices
            .get(symbol)
            .copied()
            .unwrap_or(self.config.start_price)
    }

    fn next_price(&mut self, symbol: &str) -> f64 {
        let next = match self.script.pop_front() {
            Some(p) => p,
            None => {
                let vol = self.config.volatility.abs();
                let step = if vol > 0.0 {
                    self.rng.gen_range(-vol..=vol)
                } else {
                    0.0
                };
                let p = self.price(symbol) * (1.0 + step);
                (p * 10_000.0).round() / 10_000.0
            }
        };
        self.prices.insert(symbol.to_string(), next);
        next
    }

    fn advance_epoch(&mut self) -> i64 {
        self.epoch += (self.config.tick_interval_ms / 1_000).max(1) as i64;
        self.epoch
    }

    fn stream_id(&mut self) -> String {
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        format!("sim-{id:08x}")
    }

    /// Count down open contracts on `symbol`; settle those that expire.
    fn tick_contracts(&mut self, symbol: &str, spot: f64) {
        let payout_ratio = self.config.payout_ratio;
        let mut settled = Vec::new();
        for contract in self.contracts.values_mut() {
            if contract.symbol != symbol || contract.outcome.is_some() {
                continue;
            }
            contract.current_spot = spot;
            contract.ticks_left = contract.ticks_left.saturating_sub(1);
            if contract.ticks_left == 0 {
                let won = match contract.contract_type {
                    ContractType::Call => spot > contract.entry_spot,
                    ContractType::Put => spot < contract.entry_spot,
                };
                let profit = if won {
                    (contract.stake * payout_ratio).round_cents()
                } else {
                    -contract.stake
                };
                settled.push((contract.id, won, profit));
            }
        }
        for (id, won, profit) in settled {
            let Some(contract) = self.contracts.get_mut(&id) else {
                continue;
            };
            if won {
                self.balance += contract.stake + profit;
            }
            contract.outcome = Some(Outcome {
                won,
                profit,
                balance_after: self.balance,
            });
            debug!(contract_id = id, won, %profit, "Simulated contract settled");
        }
    }
}

#[derive(Default)]
struct Controls {
    fail_next: AtomicU32,
    pings_muted: AtomicBool,
    reject_auth: AtomicBool,
    connects: AtomicU32,
    current_link: Mutex<Option<CancellationToken>>,
}

// ============================================================================
// Connector and handle
// ============================================================================

/// Connector that links to the in-process simulated venue.
#[derive(Clone)]
pub struct SimulatedConnector {
    venue: Arc<Mutex<Venue>>,
    controls: Arc<Controls>,
    tick_interval: Duration,
}

impl SimulatedConnector {
    pub fn new(config: SimConfig) -> Self {
        let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
        Self {
            venue: Arc::new(Mutex::new(Venue::new(config))),
            controls: Arc::new(Controls::default()),
            tick_interval,
        }
    }

    /// Control handle for injecting failures and prices.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            venue: self.venue.clone(),
            controls: self.controls.clone(),
        }
    }
}

impl Connector for SimulatedConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, WsResult<Link>> {
        Box::pin(async move {
            let attempt = self.controls.connects.fetch_add(1, Ordering::SeqCst) + 1;
            let fail = self
                .controls
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                debug!(attempt, %url, "Simulated connect failure");
                return Err(WsError::Network(format!(
                    "simulated connect failure to {url}"
                )));
            }

            let (client_tx, venue_rx) = mpsc::channel::<Frame>(256);
            let (venue_tx, client_rx) = mpsc::channel::<Frame>(1024);
            let token = CancellationToken::new();
            if let Some(previous) = self.controls.current_link.lock().replace(token.clone()) {
                previous.cancel();
            }

            let session = SimSession::new(self.venue.clone(), self.controls.clone());
            tokio::spawn(run_session(
                session,
                venue_rx,
                venue_tx,
                token,
                self.tick_interval,
            ));
            info!(attempt, %url, "Simulated link established");

            let sink = PollSender::new(client_tx)
                .sink_map_err(|_| WsError::Network("simulated link closed".into()));
            let stream = stream::unfold(client_rx, |mut rx| async move {
                rx.recv().await.map(|frame| (Ok(frame), rx))
            });
            Ok(Link::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

/// Runtime controls for the simulated venue.
#[derive(Clone)]
pub struct SimHandle {
    venue: Arc<Mutex<Venue>>,
    controls: Arc<Controls>,
}

impl SimHandle {
    /// Fail the next `n` connection attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.controls.fail_next.store(n, Ordering::SeqCst);
    }

    /// Drop the current link as if the network went away.
    pub fn drop_link(&self) -> bool {
        match self.controls.current_link.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop (or resume) answering `ping`.
    pub fn mute_pings(&self, muted: bool) {
        self.controls.pings_muted.store(muted, Ordering::SeqCst);
    }

    /// Reject every `authorize` with `InvalidToken`.
    pub fn reject_auth(&self, reject: bool) {
        self.controls.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// Queue prices to be served before the random walk resumes.
    pub fn push_prices<I: IntoIterator<Item = f64>>(&self, prices: I) {
        self.venue.lock().script.extend(prices);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.controls.connects.load(Ordering::SeqCst)
    }

    pub fn balance(&self) -> Money {
        self.venue.lock().balance
    }

    pub fn open_contracts(&self) -> usize {
        self.venue
            .lock()
            .contracts
            .values()
            .filter(|c| c.outcome.is_none())
            .count()
    }
}

// ============================================================================
// Per-link session
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum StreamKind {
    Ticks { symbol: String },
    Candles { symbol: String, granularity: i64 },
    Contract { contract_id: u64 },
}

#[derive(Debug, Clone)]
struct SimStream {
    id: String,
    req: Value,
    kind: StreamKind,
}

struct SimSession {
    venue: Arc<Mutex<Venue>>,
    controls: Arc<Controls>,
    authorized: bool,
    streams: Vec<SimStream>,
}

impl SimSession {
    fn new(venue: Arc<Mutex<Venue>>, controls: Arc<Controls>) -> Self {
        Self {
            venue,
            controls,
            authorized: false,
            streams: Vec::new(),
        }
    }

    fn handle_text(&mut self, text: &str) -> Vec<Value> {
        let req: Value = match serde_json::from_str(text) {
            Ok(v @ Value::Object(_)) => v,
            _ => {
                return vec![error_reply(
                    &Value::Null,
                    "error",
                    "InputValidationFailed",
                    "Malformed request",
                )]
            }
        };

        let reply = if req.get("authorize").is_some() {
            self.authorize(&req)
        } else if req.get("ping").is_some() {
            if self.controls.pings_muted.load(Ordering::SeqCst) {
                return Vec::new();
            }
            reply(&req, "ping", json!({ "ping": "pong" }))
        } else if req.get("ticks").is_some() {
            self.ticks(&req)
        } else if req.get("ticks_history").is_some() {
            self.ticks_history(&req)
        } else if req.get("proposal_open_contract").is_some() {
            self.open_contract(&req)
        } else if req.get("proposal").is_some() {
            self.proposal(&req)
        } else if req.get("buy").is_some() {
            self.buy(&req)
        } else if req.get("forget").is_some() {
            self.forget(&req)
        } else if req.get("balance").is_some() {
            self.balance(&req)
        } else {
            error_reply(&req, "error", "UnrecognisedRequest", "Unrecognised request")
        };
        vec![reply]
    }

    fn authorize(&mut self, req: &Value) -> Value {
        let token = req.get("authorize").and_then(Value::as_str).unwrap_or("");
        if self.controls.reject_auth.load(Ordering::SeqCst)
            || !TokenDiagnostic::inspect(token).is_acceptable()
        {
            return error_reply(req, "authorize", "InvalidToken", "The token is invalid.");
        }
        self.authorized = true;
        let venue = self.venue.lock();
        reply(
            req,
            "authorize",
            json!({
                "authorize": {
                    "loginid": "VRTC5550001",
                    "currency": venue.config.currency,
                    "balance": venue.balance.to_f64(),
                    "is_virtual": 1,
                }
            }),
        )
    }

    fn ticks(&mut self, req: &Value) -> Value {
        let Some(symbol) = req.get("ticks").and_then(Value::as_str).filter(|s| !s.is_empty())
        else {
            return error_reply(req, "tick", "InputValidationFailed", "Missing symbol");
        };
        let kind = StreamKind::Ticks {
            symbol: symbol.to_string(),
        };
        if self.streams.iter().any(|s| s.kind == kind) {
            return error_reply(
                req,
                "tick",
                "AlreadySubscribed",
                &format!("You are already subscribed to {symbol}"),
            );
        }
        let mut venue = self.venue.lock();
        let id = venue.stream_id();
        let quote = venue.price(symbol);
        let epoch = venue.epoch;
        drop(venue);
        self.streams.push(SimStream {
            id: id.clone(),
            req: req.clone(),
            kind,
        });
        reply(
            req,
            "tick",
            json!({
                "tick": { "symbol": symbol, "quote": quote, "epoch": epoch },
                "subscription": { "id": id },
            }),
        )
    }

    fn ticks_history(&mut self, req: &Value) -> Value {
        let Some(symbol) = req
            .get("ticks_history")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            return error_reply(req, "history", "InputValidationFailed", "Missing symbol");
        };
        let style = req.get("style").and_then(Value::as_str).unwrap_or("ticks");
        let count = req
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(10)
            .clamp(1, 5_000) as usize;
        let granularity = req.get("granularity").and_then(Value::as_i64).unwrap_or(60);
        let subscribe = req.get("subscribe").and_then(Value::as_i64) == Some(1);

        let mut venue = self.venue.lock();
        let mut prices = Vec::with_capacity(count);
        let mut times = Vec::with_capacity(count);
        for _ in 0..count {
            prices.push(venue.next_price(symbol));
            times.push(venue.advance_epoch());
        }
        let stream_id = subscribe.then(|| venue.stream_id());
        drop(venue);

        let (msg_type, mut body) = if style == "candles" {
            let candles: Vec<Value> = prices
                .iter()
                .zip(&times)
                .map(|(p, t)| json!({ "epoch": t, "open": p, "high": p, "low": p, "close": p }))
                .collect();
            ("candles", json!({ "candles": candles }))
        } else {
            (
                "history",
                json!({ "history": { "prices": prices, "times": times } }),
            )
        };

        if let Some(id) = stream_id {
            let kind = if style == "candles" {
                StreamKind::Candles {
                    symbol: symbol.to_string(),
                    granularity,
                }
            } else {
                StreamKind::Ticks {
                    symbol: symbol.to_string(),
                }
            };
            self.streams.push(SimStream {
                id: id.clone(),
                req: req.clone(),
                kind,
            });
            body["subscription"] = json!({ "id": id });
        }
        reply(req, msg_type, body)
    }

    fn proposal(&mut self, req: &Value) -> Value {
        if !self.authorized {
            return error_reply(req, "proposal", "AuthorizationRequired", "Please log in.");
        }
        let amount = req.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
        let duration = req.get("duration").and_then(Value::as_i64).unwrap_or(0);
        let contract_type = req
            .get("contract_type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<ContractType>().ok());
        let symbol = req.get("symbol").and_then(Value::as_str).unwrap_or("");

        let (Some(contract_type), Ok(stake)) = (contract_type, Money::from_f64(amount)) else {
            return error_reply(
                req,
                "proposal",
                "InputValidationFailed",
                "Invalid contract_type or amount",
            );
        };
        if !stake.is_positive() || duration <= 0 || symbol.is_empty() {
            return error_reply(
                req,
                "proposal",
                "ContractBuyValidationError",
                "Stake, duration and symbol are required",
            );
        }

        let mut venue = self.venue.lock();
        let id = format!("PROP-{}", venue.next_proposal_id);
        venue.next_proposal_id += 1;
        let payout = (stake + (stake * venue.config.payout_ratio)).round_cents();
        let spot = venue.price(symbol);
        venue.proposals.insert(
            id.clone(),
            Proposal {
                symbol: symbol.to_string(),
                contract_type,
                stake,
            },
        );
        drop(venue);

        reply(
            req,
            "proposal",
            json!({
                "proposal": {
                    "id": id,
                    "ask_price": stake.to_f64(),
                    "payout": payout.to_f64(),
                    "spot": spot,
                }
            }),
        )
    }

    fn buy(&mut self, req: &Value) -> Value {
        if !self.authorized {
            return error_reply(req, "buy", "AuthorizationRequired", "Please log in.");
        }
        let proposal_id = req.get("buy").and_then(Value::as_str).unwrap_or("");
        let price = req.get("price").and_then(Value::as_f64).unwrap_or(0.0);

        let mut venue = self.venue.lock();
        let Some(proposal) = venue.proposals.remove(proposal_id) else {
            return error_reply(req, "buy", "InvalidContractProposal", "Unknown proposal");
        };
        if price + f64::EPSILON < proposal.stake.to_f64() {
            return error_reply(
                req,
                "buy",
                "ContractBuyValidationError",
                "Price is below the ask price",
            );
        }
        if venue.balance < proposal.stake {
            return error_reply(req, "buy", "InsufficientBalance", "Insufficient balance");
        }

        venue.balance -= proposal.stake;
        let id = venue.next_contract_id;
        venue.next_contract_id += 1;
        let spot = venue.price(&proposal.symbol);
        let ticks_left = venue.config.contract_ticks.max(1);
        let balance_after = venue.balance;
        let start_time = venue.epoch;
        venue.contracts.insert(
            id,
            SimContract {
                id,
                symbol: proposal.symbol.clone(),
                contract_type: proposal.contract_type,
                stake: proposal.stake,
                entry_spot: spot,
                current_spot: spot,
                ticks_left,
                outcome: None,
            },
        );
        drop(venue);

        reply(
            req,
            "buy",
            json!({
                "buy": {
                    "contract_id": id,
                    "buy_price": proposal.stake.to_f64(),
                    "balance_after": balance_after.to_f64(),
                    "start_time": start_time,
                    "transaction_id": id + 1_000_000,
                    "longcode": format!(
                        "Win payout if {} is {} than entry spot after {} ticks.",
                        proposal.symbol,
                        if proposal.contract_type == ContractType::Call { "higher" } else { "lower" },
                        ticks_left
                    ),
                }
            }),
        )
    }

    fn open_contract(&mut self, req: &Value) -> Value {
        let Some(contract_id) = req.get("contract_id").and_then(Value::as_u64) else {
            return error_reply(
                req,
                "proposal_open_contract",
                "InputValidationFailed",
                "Missing contract_id",
            );
        };
        let subscribe = req.get("subscribe").and_then(Value::as_i64) == Some(1);

        let mut venue = self.venue.lock();
        let Some(contract) = venue.contracts.get(&contract_id).cloned() else {
            return error_reply(
                req,
                "proposal_open_contract",
                "InvalidContractId",
                "Unknown contract",
            );
        };
        let stream_id = subscribe.then(|| venue.stream_id());
        drop(venue);

        let mut body = json!({ "proposal_open_contract": contract.to_json() });
        if let Some(id) = stream_id {
            if contract.outcome.is_none() {
                self.streams.push(SimStream {
                    id: id.clone(),
                    req: req.clone(),
                    kind: StreamKind::Contract { contract_id },
                });
            }
            body["subscription"] = json!({ "id": id });
        }
        reply(req, "proposal_open_contract", body)
    }

    fn forget(&mut self, req: &Value) -> Value {
        let id = req.get("forget").and_then(Value::as_str).unwrap_or("");
        let before = self.streams.len();
        self.streams.retain(|s| s.id != id);
        let removed = before != self.streams.len();
        reply(req, "forget", json!({ "forget": u8::from(removed) }))
    }

    fn balance(&mut self, req: &Value) -> Value {
        if !self.authorized {
            return error_reply(req, "balance", "AuthorizationRequired", "Please log in.");
        }
        let venue = self.venue.lock();
        reply(
            req,
            "balance",
            json!({
                "balance": {
                    "balance": venue.balance.to_f64(),
                    "currency": venue.config.currency,
                }
            }),
        )
    }

    /// Advance every active symbol by one price and emit stream updates.
    fn on_tick(&mut self) -> Vec<Value> {
        let mut venue = self.venue.lock();
        let mut symbols: Vec<String> = self
            .streams
            .iter()
            .filter_map(|s| match &s.kind {
                StreamKind::Ticks { symbol } | StreamKind::Candles { symbol, .. } => {
                    Some(symbol.clone())
                }
                StreamKind::Contract { .. } => None,
            })
            .chain(
                venue
                    .contracts
                    .values()
                    .filter(|c| c.outcome.is_none())
                    .map(|c| c.symbol.clone()),
            )
            .collect();
        symbols.sort();
        symbols.dedup();
        if symbols.is_empty() {
            return Vec::new();
        }

        let epoch = venue.advance_epoch();
        let mut spots = HashMap::new();
        for symbol in &symbols {
            let spot = venue.next_price(symbol);
            venue.tick_contracts(symbol, spot);
            spots.insert(symbol.clone(), spot);
        }

        let mut out = Vec::new();
        let mut finished = Vec::new();
        for stream in &self.streams {
            let sub = json!({ "id": stream.id });
            match &stream.kind {
                StreamKind::Ticks { symbol } => {
                    if let Some(spot) = spots.get(symbol) {
                        out.push(reply(
                            &stream.req,
                            "tick",
                            json!({
                                "tick": { "symbol": symbol, "quote": spot, "epoch": epoch },
                                "subscription": sub,
                            }),
                        ));
                    }
                }
                StreamKind::Candles {
                    symbol,
                    granularity,
                } => {
                    if let Some(spot) = spots.get(symbol) {
                        let g = (*granularity).max(1);
                        out.push(reply(
                            &stream.req,
                            "ohlc",
                            json!({
                                "ohlc": {
                                    "symbol": symbol,
                                    "open_time": epoch - epoch.rem_euclid(g),
                                    "epoch": epoch,
                                    "granularity": g,
                                    "open": spot.to_string(),
                                    "high": spot.to_string(),
                                    "low": spot.to_string(),
                                    "close": spot.to_string(),
                                },
                                "subscription": sub,
                            }),
                        ));
                    }
                }
                StreamKind::Contract { contract_id } => {
                    if let Some(contract) = venue.contracts.get(contract_id) {
                        if contract.outcome.is_some() {
                            finished.push(stream.id.clone());
                        }
                        out.push(reply(
                            &stream.req,
                            "proposal_open_contract",
                            json!({
                                "proposal_open_contract": contract.to_json(),
                                "subscription": sub,
                            }),
                        ));
                    }
                }
            }
        }
        drop(venue);
        self.streams.retain(|s| !finished.contains(&s.id));
        out
    }
}

async fn run_session(
    mut session: SimSession,
    mut inbound: mpsc::Receiver<Frame>,
    outbound: mpsc::Sender<Frame>,
    token: CancellationToken,
    tick_interval: Duration,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.tick().await;

    loop {
        let replies = tokio::select! {
            () = token.cancelled() => {
                debug!("Simulated link dropped");
                return;
            }
            frame = inbound.recv() => match frame {
                Some(Frame::Text(text)) => session.handle_text(&text),
                Some(Frame::Ping(data)) => {
                    if outbound.send(Frame::Pong(data)).await.is_err() {
                        return;
                    }
                    continue;
                }
                Some(Frame::Pong(_)) => continue,
                Some(Frame::Close) | None => {
                    debug!("Simulated link closed by client");
                    return;
                }
            },
            _ = ticker.tick() => session.on_tick(),
        };

        for reply in replies {
            if outbound.send(Frame::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}

fn reply(req: &Value, msg_type: &str, mut body: Value) -> Value {
    body["msg_type"] = json!(msg_type);
    if !req.is_null() {
        body["echo_req"] = req.clone();
    }
    if let Some(req_id) = req.get("req_id") {
        body["req_id"] = req_id.clone();
    }
    body
}

fn error_reply(req: &Value, msg_type: &str, code: &str, message: &str) -> Value {
    reply(
        req,
        msg_type,
        json!({ "error": { "code": code, "message": message } }),
    )
}
