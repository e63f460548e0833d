//! Application configuration.
//!
//! Loaded from TOML, then overridden from the environment. Every section
//! has defaults, so an empty file (or no file) yields a runnable
//! simulation setup.

use crate::error::{AppError, AppResult};
use deriv_core::{AccountType, Money};
use deriv_risk::RiskConfig;
use deriv_signal::SignalConfig;
use deriv_trader::TraderConfig;
use deriv_ws::{
    BackoffPolicy, ConnectionConfig, Credentials, HeartbeatConfig, SimConfig, TokenDiagnostic,
    DEFAULT_APP_ID, DEFAULT_BACKUP_ENDPOINT, DEFAULT_PRIMARY_ENDPOINT,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DERIV_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Token used against the simulated venue when none is configured.
const SIMULATION_TOKEN: &str = "placeholder_simulation";

// ============================================================================
// Tokens
// ============================================================================

/// Per-account API tokens. Never printed in clear.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub demo: Option<String>,
    #[serde(default)]
    pub real: Option<String>,
}

impl TokenConfig {
    pub fn token(&self, account: AccountType) -> Option<&str> {
        match account {
            AccountType::Demo => self.demo.as_deref(),
            AccountType::Real => self.real.as_deref(),
        }
        .filter(|t| !t.is_empty())
    }

    pub fn diagnose(&self, account: AccountType) -> TokenDiagnostic {
        TokenDiagnostic::inspect(self.token(account).unwrap_or(""))
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("demo", &self.demo.as_deref().map(deriv_ws::mask_token))
            .field("real", &self.real.as_deref().map(deriv_ws::mask_token))
            .finish()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Endpoint, timeout, reconnect and heartbeat settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_primary_url")]
    pub primary_url: String,
    /// Alternated with the primary on reconnect. Empty disables rotation.
    #[serde(default = "default_backup_url")]
    pub backup_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_disconnect_timeout_ms")]
    pub disconnect_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_ack_timeout_ms")]
    pub heartbeat_ack_timeout_ms: u64,
    /// Consecutive missed acks that force a reconnect.
    #[serde(default = "default_heartbeat_max_missed")]
    pub heartbeat_max_missed: u32,
}

fn default_primary_url() -> String {
    DEFAULT_PRIMARY_ENDPOINT.to_string()
}

fn default_backup_url() -> Option<String> {
    Some(DEFAULT_BACKUP_ENDPOINT.to_string())
}

fn default_request_timeout_ms() -> u64 {
    20_000
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

fn default_disconnect_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_jitter_ms() -> u64 {
    250
}

fn default_heartbeat_interval_ms() -> u64 {
    20_000
}

fn default_heartbeat_ack_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_max_missed() -> u32 {
    2
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            primary_url: default_primary_url(),
            backup_url: default_backup_url(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            disconnect_timeout_ms: default_disconnect_timeout_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_ack_timeout_ms: default_heartbeat_ack_timeout_ms(),
            heartbeat_max_missed: default_heartbeat_max_missed(),
        }
    }
}

impl ConnectionSettings {
    fn validate(&self) -> AppResult<()> {
        if self.primary_url.trim().is_empty() {
            return Err(AppError::Config("primary_url must not be empty".to_string()));
        }
        let positive = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("reconnect_base_delay_ms", self.reconnect_base_delay_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("heartbeat_ack_timeout_ms", self.heartbeat_ack_timeout_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(AppError::Config(format!("{name} must be greater than 0")));
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(AppError::Config(format!(
                "reconnect_max_delay_ms ({}) must be >= reconnect_base_delay_ms ({})",
                self.reconnect_max_delay_ms, self.reconnect_base_delay_ms
            )));
        }
        if self.heartbeat_max_missed == 0 {
            return Err(AppError::Config(
                "heartbeat_max_missed must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Simulated venue parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_sim_seed")]
    pub seed: u64,
    #[serde(default = "default_sim_start_price")]
    pub start_price: f64,
    #[serde(default = "default_sim_volatility")]
    pub volatility: f64,
    #[serde(default = "default_sim_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_sim_contract_ticks")]
    pub contract_ticks: u32,
    #[serde(default = "default_sim_payout_ratio")]
    pub payout_ratio: Decimal,
    #[serde(default = "default_sim_initial_balance")]
    pub initial_balance: Money,
    /// Prices served before the random walk takes over.
    #[serde(default)]
    pub script: Vec<f64>,
}

fn default_sim_seed() -> u64 {
    42
}

fn default_sim_start_price() -> f64 {
    1_000.0
}

fn default_sim_volatility() -> f64 {
    0.001
}

fn default_sim_tick_interval_ms() -> u64 {
    1_000
}

fn default_sim_contract_ticks() -> u32 {
    5
}

fn default_sim_payout_ratio() -> Decimal {
    Decimal::new(95, 2)
}

fn default_sim_initial_balance() -> Money {
    Money::new(Decimal::from(10_000))
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: default_sim_seed(),
            start_price: default_sim_start_price(),
            volatility: default_sim_volatility(),
            tick_interval_ms: default_sim_tick_interval_ms(),
            contract_ticks: default_sim_contract_ticks(),
            payout_ratio: default_sim_payout_ratio(),
            initial_balance: default_sim_initial_balance(),
            script: Vec::new(),
        }
    }
}

impl SimulationSettings {
    pub fn to_sim_config(&self, currency: &str) -> SimConfig {
        SimConfig {
            seed: self.seed,
            start_price: self.start_price,
            volatility: self.volatility,
            tick_interval_ms: self.tick_interval_ms,
            contract_ticks: self.contract_ticks,
            payout_ratio: self.payout_ratio,
            initial_balance: self.initial_balance,
            currency: currency.to_string(),
            script: self.script.clone(),
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.start_price <= 0.0 || !self.start_price.is_finite() {
            return Err(AppError::Config(format!(
                "simulation start_price ({}) must be positive",
                self.start_price
            )));
        }
        if self.tick_interval_ms == 0 || self.contract_ticks == 0 {
            return Err(AppError::Config(
                "simulation tick_interval_ms and contract_ticks must be greater than 0"
                    .to_string(),
            ));
        }
        if self.payout_ratio <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "simulation payout_ratio ({}) must be positive",
                self.payout_ratio
            )));
        }
        Ok(())
    }
}

// ============================================================================
// AppConfig
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_id")]
    pub app_id: u32,
    #[serde(default)]
    pub account_type: AccountType,
    /// Trade against the in-process simulated venue.
    #[serde(default = "default_simulation")]
    pub simulation: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub trader: TraderConfig,
    #[serde(default)]
    pub sim: SimulationSettings,
}

fn default_app_id() -> u32 {
    DEFAULT_APP_ID
}

fn default_simulation() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            account_type: AccountType::default(),
            simulation: default_simulation(),
            log_level: default_log_level(),
            tokens: TokenConfig::default(),
            connection: ConnectionSettings::default(),
            signal: SignalConfig::default(),
            risk: RiskConfig::default(),
            trader: TraderConfig::default(),
            sim: SimulationSettings::default(),
        }
    }
}

impl AppConfig {
    /// Resolve the config path (`path`, else `DERIV_CONFIG`, else
    /// `config/default.toml`), load it and apply environment overrides.
    /// A missing file yields defaults.
    pub fn load(path: Option<String>) -> AppResult<Self> {
        let config_path = path
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            warn!(path = %config_path, "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a specific file, without environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (an environment reader).
    ///
    /// Values are trimmed and anything after `#` is dropped. Values that do
    /// not parse are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(|raw| clean_value(&raw));

        if let Some(v) = parse_value(&get, "DERIV_APP_ID") {
            self.app_id = v;
        }
        if let Some(token) = get("DERIV_API_TOKEN_DEMO").or_else(|| get("DERIV_API_TOKEN")) {
            self.tokens.demo = Some(token);
        }
        if let Some(token) = get("DERIV_API_TOKEN_REAL") {
            self.tokens.real = Some(token);
        }
        if let Some(v) = parse_value(&get, "DERIV_ACCOUNT_TYPE") {
            self.account_type = v;
        }
        if let Some(v) = parse_flag(&get, "ENABLE_SIMULATION") {
            self.simulation = v;
        }
        if let Some(v) = get("TRADING_SYMBOL") {
            self.trader.symbol = v;
        }
        if let Some(v) = parse_value::<Money, _>(&get, "STAKE_AMOUNT") {
            self.trader.stake = v;
        }
        if let Some(v) = parse_value(&get, "MAX_CONCURRENT_TRADES") {
            self.risk.max_concurrent_trades = v;
        }
        if let Some(v) = parse_value(&get, "SHORT_MA_PERIOD") {
            self.signal.short_period = v;
        }
        if let Some(v) = parse_value(&get, "MEDIUM_MA_PERIOD") {
            self.signal.medium_period = v;
        }
        if let Some(v) = parse_value(&get, "LONG_MA_PERIOD") {
            self.signal.long_period = v;
        }
        if let Some(v) = parse_value(&get, "SIGNAL_THRESHOLD") {
            self.trader.signal_threshold = v;
        }
        if let Some(v) = parse_value::<Money, _>(&get, "MAX_DAILY_LOSS") {
            self.risk.max_daily_loss = v;
        }
        if let Some(v) = parse_value(&get, "MAX_DAILY_TRADES") {
            self.risk.max_daily_trades = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.app_id == 0 {
            return Err(AppError::Config(
                "app_id must be a positive integer".to_string(),
            ));
        }

        self.signal.validate()?;
        self.risk.validate()?;
        self.trader.validate()?;
        self.connection.validate()?;

        if self.simulation {
            self.sim.validate()?;
        } else {
            self.validate_live_token()?;
        }
        Ok(())
    }

    /// The active account's token must have a real token's shape.
    fn validate_live_token(&self) -> AppResult<()> {
        let account = self.account_type;
        let diagnostic = self.tokens.diagnose(account);
        if !diagnostic.is_acceptable() {
            return Err(AppError::Config(format!(
                "invalid {account} API token: {diagnostic}"
            )));
        }
        if diagnostic.placeholder {
            return Err(AppError::Config(format!(
                "{account} API token is a placeholder; set DERIV_API_TOKEN_{} for live trading: {diagnostic}",
                account.as_str().to_ascii_uppercase()
            )));
        }
        Ok(())
    }

    /// Diagnostic for the active account's token.
    pub fn token_diagnostic(&self) -> TokenDiagnostic {
        self.tokens.diagnose(self.account_type)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let c = &self.connection;
        let mut demo = self.tokens.demo.clone().filter(|t| !t.is_empty());
        let mut real = self.tokens.real.clone().filter(|t| !t.is_empty());
        if self.simulation {
            let slot = match self.account_type {
                AccountType::Demo => &mut demo,
                AccountType::Real => &mut real,
            };
            slot.get_or_insert_with(|| SIMULATION_TOKEN.to_string());
        }

        ConnectionConfig {
            primary_url: c.primary_url.clone(),
            backup_url: c.backup_url.clone().filter(|u| !u.trim().is_empty()),
            app_id: self.app_id,
            account_type: self.account_type,
            credentials: Credentials::new(demo, real),
            request_timeout_ms: c.request_timeout_ms,
            connect_timeout_ms: c.connect_timeout_ms,
            disconnect_timeout_ms: c.disconnect_timeout_ms,
            backoff: BackoffPolicy {
                base_delay_ms: c.reconnect_base_delay_ms,
                max_delay_ms: c.reconnect_max_delay_ms,
                max_attempts: c.max_reconnect_attempts,
                jitter_ms: c.reconnect_jitter_ms,
            },
            heartbeat: HeartbeatConfig {
                interval_ms: c.heartbeat_interval_ms,
                ack_timeout_ms: c.heartbeat_ack_timeout_ms,
                max_missed: c.heartbeat_max_missed,
            },
        }
    }

    pub fn sim_config(&self) -> SimConfig {
        self.sim.to_sim_config(&self.trader.currency)
    }
}

/// Trim and strip an inline `#` comment. Empty values count as unset.
fn clean_value(raw: &str) -> Option<String> {
    let value = raw.split('#').next().unwrap_or_default().trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_value<T, G>(get: &G, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = get(key)?;
    match value.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, %value, error = %e, "Ignoring unparsable environment override");
            None
        }
    }
}

fn parse_flag<G>(get: &G, key: &str) -> Option<bool>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(key)?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, %value, "Ignoring unparsable environment override");
            None
        }
    }
}
