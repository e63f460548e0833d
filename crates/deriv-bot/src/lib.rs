//! Deriv moving-average crossover bot.
//!
//! Main application that wires the components together:
//! - Configuration from TOML plus environment overrides
//! - Live or simulated WebSocket session
//! - Trade orchestrator with risk ledger and signal engine
//! - Connectivity check with a per-step report

pub mod app;
pub mod check;
pub mod config;
pub mod error;

pub use app::Application;
pub use check::{CheckReport, CheckStep};
pub use config::{AppConfig, ConnectionSettings, SimulationSettings};
pub use error::{AppError, AppResult};
