//! Core domain types for the up/down hedge engine.
//!
//! This crate provides fundamental types used throughout the trading system:
//! - `Price`, `Size`: Precision-safe numeric types (prices are fractional, 0..=1)
//! - `ConditionId`, `TokenId`, `Timeframe`: Market identifiers
//! - `MarketSnapshot`, `BookSnapshot`: Captured upstream state
//! - `compute_ask_depth`: Book depth estimation under a price ceiling
//! - `Leg`, `MarketOrderArgs`, `OrderAck`: Order plumbing
//! - `Clock`: Injectable millisecond clock

pub mod book;
pub mod clock;
pub mod decimal;
pub mod depth;
pub mod error;
pub mod future;
pub mod market;
pub mod order;

pub use book::{BookLevel, BookSet, BookSnapshot};
pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use decimal::{cents_to_price, price_to_cents, Price, Size};
pub use depth::{compute_ask_depth, compute_bid_depth, AskDepth, DEFAULT_MAX_LEVELS};
pub use error::{CoreError, Result};
pub use future::BoxFuture;
pub use market::{ConditionId, MarketInfo, MarketSnapshot, OutcomeToken, Timeframe, TokenId};
pub use order::{Leg, MarketOrderArgs, OrderAck, OrderSide};
