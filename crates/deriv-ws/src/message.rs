//! Deriv WebSocket API v3 message types.
//!
//! Requests are JSON objects correlated by an integer `req_id`. Responses
//! echo the `req_id`, name themselves in `msg_type` and carry an
//! `error: {code, message}` object on failure. Stream messages (`tick`,
//! `ohlc`, `proposal_open_contract`) carry `subscription.id`.

use deriv_core::{ContractType, Money};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{WsError, WsResult};
use crate::session::AccountInfo;
use crate::subscription::{Channel, SubscriptionKey};

// ============================================================================
// Outbound
// ============================================================================

/// Outbound API request without its `req_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct WsRequest {
    body: Map<String, Value>,
}

/// Parameters for a rise/fall `proposal`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalParams {
    pub symbol: String,
    pub contract_type: ContractType,
    pub amount: Money,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
}

impl WsRequest {
    /// Build from any JSON object.
    pub fn from_value(value: Value) -> WsResult<Self> {
        match value {
            Value::Object(body) if !body.is_empty() => Ok(Self { body }),
            other => Err(WsError::Validation(format!(
                "request must be a non-empty JSON object, got {other}"
            ))),
        }
    }

    fn object(value: Value) -> Self {
        match value {
            Value::Object(body) => Self { body },
            _ => Self { body: Map::new() },
        }
    }

    pub fn authorize(token: &str) -> Self {
        Self::object(json!({ "authorize": token }))
    }

    pub fn ping() -> Self {
        Self::object(json!({ "ping": 1 }))
    }

    pub fn balance() -> Self {
        Self::object(json!({ "balance": 1 }))
    }

    /// Live tick stream for a symbol.
    pub fn ticks(symbol: &str) -> Self {
        Self::object(json!({ "ticks": symbol, "subscribe": 1 }))
    }

    /// Latest `count` ticks, without a stream.
    pub fn tick_history(symbol: &str, count: usize) -> Self {
        Self::object(json!({
            "ticks_history": symbol,
            "style": "ticks",
            "count": count,
            "end": "latest",
        }))
    }

    /// Candle history plus an `ohlc` stream.
    pub fn candles(symbol: &str, granularity: u32, count: usize) -> Self {
        Self::object(json!({
            "ticks_history": symbol,
            "style": "candles",
            "granularity": granularity,
            "count": count,
            "end": "latest",
            "subscribe": 1,
        }))
    }

    pub fn proposal(params: &ProposalParams) -> Self {
        Self::object(json!({
            "proposal": 1,
            "amount": params.amount.to_f64(),
            "basis": "stake",
            "contract_type": params.contract_type.as_str(),
            "currency": params.currency,
            "duration": params.duration,
            "duration_unit": params.duration_unit,
            "symbol": params.symbol,
        }))
    }

    pub fn buy(proposal_id: &str, price: f64) -> Self {
        Self::object(json!({ "buy": proposal_id, "price": price }))
    }

    /// Status stream for a bought contract.
    pub fn open_contract(contract_id: u64) -> Self {
        Self::object(json!({
            "proposal_open_contract": 1,
            "contract_id": contract_id,
            "subscribe": 1,
        }))
    }

    pub fn forget(subscription_id: &str) -> Self {
        Self::object(json!({ "forget": subscription_id }))
    }

    /// Request name (its first key), for logging.
    pub fn name(&self) -> &str {
        self.body.keys().next().map(String::as_str).unwrap_or("unknown")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Serialize with the given correlation id.
    pub fn encode(&self, req_id: u64) -> WsResult<String> {
        let mut body = self.body.clone();
        body.insert("req_id".to_string(), Value::from(req_id));
        Ok(serde_json::to_string(&body)?)
    }
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Classified inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub req_id: Option<u64>,
    pub msg_type: String,
    pub error: Option<ApiError>,
    pub subscription_id: Option<String>,
    pub body: Value,
}

impl InboundMessage {
    pub fn parse(text: &str) -> WsResult<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(body: Value) -> WsResult<Self> {
        if !body.is_object() {
            return Err(WsError::Validation("message is not a JSON object".into()));
        }
        let msg_type = body
            .get("msg_type")
            .and_then(Value::as_str)
            .ok_or_else(|| WsError::Validation("message has no msg_type".into()))?
            .to_string();
        let req_id = body.get("req_id").and_then(Value::as_u64);
        let error = match body.get("error") {
            Some(e) => Some(ApiError::deserialize(e)?),
            None => None,
        };
        let subscription_id = body
            .pointer("/subscription/id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            req_id,
            msg_type,
            error,
            subscription_id,
            body,
        })
    }

    /// Convert into the outcome seen by the requester.
    pub fn into_result(self) -> WsResult<Value> {
        match self.error {
            Some(err) => Err(WsError::Api {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.body),
        }
    }

    /// Dispatch key for stream messages.
    pub fn stream_key(&self) -> Option<SubscriptionKey> {
        if self.error.is_some() {
            return None;
        }
        match self.msg_type.as_str() {
            "tick" => str_at(&self.body, "/tick/symbol")
                .map(|s| SubscriptionKey::new(Channel::Ticks, s)),
            "ohlc" => str_at(&self.body, "/ohlc/symbol")
                .map(|s| SubscriptionKey::new(Channel::Candles, s)),
            "history" => str_at(&self.body, "/echo_req/ticks_history")
                .map(|s| SubscriptionKey::new(Channel::Ticks, s)),
            "candles" => str_at(&self.body, "/echo_req/ticks_history")
                .map(|s| SubscriptionKey::new(Channel::Candles, s)),
            "proposal_open_contract" => u64_at(&self.body, "/proposal_open_contract/contract_id")
                .map(|id| SubscriptionKey::new(Channel::Contract, id.to_string())),
            _ => None,
        }
    }

    /// Stream data carried by this message, in arrival order.
    pub fn stream_payloads(&self) -> Vec<StreamPayload> {
        match self.msg_type.as_str() {
            "tick" => TickData::from_body(&self.body)
                .map(StreamPayload::Tick)
                .into_iter()
                .collect(),
            "ohlc" => CandleData::from_ohlc(&self.body)
                .map(StreamPayload::Candle)
                .into_iter()
                .collect(),
            "history" => TickData::from_history(&self.body)
                .into_iter()
                .map(StreamPayload::Tick)
                .collect(),
            "candles" => CandleData::from_candles(&self.body)
                .into_iter()
                .map(StreamPayload::Candle)
                .collect(),
            "proposal_open_contract" => ContractUpdate::from_body(&self.body)
                .map(StreamPayload::Contract)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Stream data delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    Tick(TickData),
    Candle(CandleData),
    Contract(ContractUpdate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickData {
    pub symbol: String,
    pub quote: f64,
    pub epoch: i64,
}

impl TickData {
    pub fn from_body(body: &Value) -> Option<Self> {
        Some(Self {
            symbol: str_at(body, "/tick/symbol")?.to_string(),
            quote: f64_at(body, "/tick/quote")?,
            epoch: i64_at(body, "/tick/epoch").unwrap_or_default(),
        })
    }

    /// Ticks from a `history` response.
    pub fn from_history(body: &Value) -> Vec<Self> {
        let Some(symbol) = str_at(body, "/echo_req/ticks_history") else {
            return Vec::new();
        };
        let prices = body
            .pointer("/history/prices")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let times = body
            .pointer("/history/times")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        prices
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                Some(Self {
                    symbol: symbol.to_string(),
                    quote: as_f64(p)?,
                    epoch: times.get(i).and_then(as_i64).unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandleData {
    pub symbol: String,
    pub open_time: i64,
    pub close: f64,
}

impl CandleData {
    pub fn from_ohlc(body: &Value) -> Option<Self> {
        Some(Self {
            symbol: str_at(body, "/ohlc/symbol")?.to_string(),
            open_time: i64_at(body, "/ohlc/open_time").unwrap_or_default(),
            close: f64_at(body, "/ohlc/close")?,
        })
    }

    /// Candles from a `candles` history response.
    pub fn from_candles(body: &Value) -> Vec<Self> {
        let Some(symbol) = str_at(body, "/echo_req/ticks_history") else {
            return Vec::new();
        };
        body.get("candles")
            .and_then(Value::as_array)
            .map(|candles| {
                candles
                    .iter()
                    .filter_map(|c| {
                        Some(Self {
                            symbol: symbol.to_string(),
                            open_time: c.get("epoch").and_then(as_i64).unwrap_or_default(),
                            close: c.get("close").and_then(as_f64)?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `proposal_open_contract` update.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractUpdate {
    pub contract_id: u64,
    pub is_sold: bool,
    pub profit: Option<f64>,
    pub balance_after: Option<f64>,
    pub status: Option<String>,
}

impl ContractUpdate {
    pub fn from_body(body: &Value) -> Option<Self> {
        let poc = body.get("proposal_open_contract")?;
        Some(Self {
            contract_id: poc.get("contract_id").and_then(as_u64)?,
            is_sold: poc.get("is_sold").and_then(as_i64).unwrap_or(0) == 1,
            profit: poc.get("profit").and_then(as_f64),
            balance_after: poc.get("balance_after").and_then(as_f64),
            status: poc.get("status").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Quote returned by `proposal`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalQuote {
    pub id: String,
    pub ask_price: f64,
    pub payout: f64,
}

impl ProposalQuote {
    pub fn from_body(body: &Value) -> WsResult<Self> {
        Ok(Self {
            id: str_at(body, "/proposal/id")
                .ok_or_else(|| missing("proposal.id"))?
                .to_string(),
            ask_price: f64_at(body, "/proposal/ask_price").ok_or_else(|| missing("proposal.ask_price"))?,
            payout: f64_at(body, "/proposal/payout").unwrap_or_default(),
        })
    }
}

/// Receipt returned by `buy`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyReceipt {
    pub contract_id: u64,
    pub buy_price: f64,
    pub balance_after: Option<f64>,
}

impl BuyReceipt {
    pub fn from_body(body: &Value) -> WsResult<Self> {
        Ok(Self {
            contract_id: body
                .pointer("/buy/contract_id")
                .and_then(as_u64)
                .ok_or_else(|| missing("buy.contract_id"))?,
            buy_price: f64_at(body, "/buy/buy_price").unwrap_or_default(),
            balance_after: f64_at(body, "/buy/balance_after"),
        })
    }
}

impl AccountInfo {
    pub fn from_authorize(body: &Value) -> WsResult<Self> {
        let auth = body.get("authorize").ok_or_else(|| missing("authorize"))?;
        let balance = auth.get("balance").and_then(as_f64).unwrap_or_default();
        Ok(Self {
            login_id: auth
                .get("loginid")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            currency: auth
                .get("currency")
                .and_then(Value::as_str)
                .unwrap_or("USD")
                .to_string(),
            balance: Money::from_f64(balance).unwrap_or(Money::ZERO),
            is_virtual: auth.get("is_virtual").and_then(as_i64).unwrap_or(0) == 1,
        })
    }
}

/// Operator hint for a venue error code.
pub fn api_error_hint(code: &str) -> &'static str {
    match code {
        "InvalidToken" => "API token is invalid or expired; generate a new token with read and trade scopes",
        "AuthorizationRequired" => "request needs an authorized session; check the token for the active account",
        "InputValidationFailed" => "request parameters were rejected; check symbol, amount and duration",
        "MarketIsClosed" => "market is closed for this symbol; wait for it to open or use a synthetic index",
        "MarketNotOpen" => "market is not open yet for this symbol",
        "RateLimit" => "too many requests; slow down and retry later",
        "ContractBuyValidationError" => "contract purchase rejected; check stake limits and contract parameters",
        "BalanceError" | "InsufficientBalance" => "insufficient balance for this stake",
        "SymbolValidationError" => "symbol is not available; check the trading symbol",
        _ => "unexpected API error",
    }
}

/// Whether an `authorize` failure means the credentials are bad.
pub fn is_auth_error_code(code: &str) -> bool {
    matches!(code, "InvalidToken" | "AuthorizationRequired")
}

// ============================================================================
// Helpers
// ============================================================================

fn missing(field: &str) -> WsError {
    WsError::Validation(format!("response missing {field}"))
}

fn str_at<'a>(body: &'a Value, pointer: &str) -> Option<&'a str> {
    body.pointer(pointer).and_then(Value::as_str)
}

fn f64_at(body: &Value, pointer: &str) -> Option<f64> {
    body.pointer(pointer).and_then(as_f64)
}

fn i64_at(body: &Value, pointer: &str) -> Option<i64> {
    body.pointer(pointer).and_then(as_i64)
}

fn u64_at(body: &Value, pointer: &str) -> Option<u64> {
    body.pointer(pointer).and_then(as_u64)
}

// The venue sends some numbers as strings (`ohlc.close`, `balance`).
fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
