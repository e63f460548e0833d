//! Moving-average crossover signal engine.
//!
//! Keeps a bounded price buffer per instrument and derives a Buy/Sell/None
//! signal from three simple moving averages once the longest window is full.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;

pub use buffer::{PriceBuffer, PushOutcome};
pub use config::SignalConfig;
pub use engine::{crossover, SignalEngine};
pub use error::{SignalError, SignalResult};
