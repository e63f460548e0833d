//! Trade orchestration for the Deriv bot.
//!
//! Turns price events into settled trades on a single worker:
//! - `Trader`: the event loop (signal -> risk -> order -> settlement) with
//!   shutdown draining
//! - `OrderGateway`: venue seam, implemented over the WebSocket session and
//!   by a recording mock
//! - `StakeSizing`, `OrderRequest`: stake rules and trade validation
//! - `PositionBook`: Pending and Open positions

pub mod book;
pub mod config;
pub mod error;
pub mod gateway;
pub mod order;
pub mod trader;

pub use book::PositionBook;
pub use config::{FeedKind, StakeSizing, TraderConfig};
pub use error::{TraderError, TraderResult};
pub use gateway::{DynOrderGateway, MockOrderGateway, OrderGateway, PriceFeed, WsOrderGateway};
pub use order::{OrderReceipt, OrderRequest};
pub use trader::{RunSummary, Trader};
