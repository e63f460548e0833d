//! Prometheus metrics and structured logging for the Deriv trading bot.
//!
//! - Structured logging with tracing (pretty in development, JSON in production)
//! - Prometheus collectors for session state, reconnects, signals, orders and risk blocks
//! - Text exposition via [`Metrics::render`] for the connection check report

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
