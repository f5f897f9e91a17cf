//! Up/down hedge bot.
//!
//! Wires the HTTP market/book adapter, the trading client, the history
//! ledger and the hedge engine together, then runs the scheduler until
//! Ctrl-C.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, HistoryConfig, TradingConfig, TradingMode};
pub use error::{AppError, AppResult};
