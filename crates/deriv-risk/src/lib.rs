//! Daily risk ledger.
//!
//! Every order must be approved here first. The ledger tracks, per
//! trading day:
//! - Confirmed trade count against `max_daily_trades`
//! - Open positions against `max_concurrent_trades`
//! - Realized P&L plus worst-case open exposure against `max_daily_loss`
//!
//! The trading day rolls over at the first approval observed on a new
//! calendar date, read from a [`Clock`].

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RiskConfig;
pub use error::{RiskError, RiskResult};
pub use ledger::{RiskLedger, RiskLimitExceeded, RiskState};
pub use stats::DailyStats;
