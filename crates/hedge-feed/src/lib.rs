//! Market and order book data for the hedge engine.
//!
//! - `SnapshotCache`: single-flight, rate-limited, backoff-aware keyed cache
//! - `DataCache`: market list and book slots per `Scope`
//! - `MarketProvider` / `OrderbookProvider`: upstream seams
//! - `ClobClient`: HTTP implementation of both providers

pub mod cache;
pub mod client;
pub mod data_cache;
pub mod error;
pub mod provider;

pub use cache::{CacheConfig, CacheRead, SlotStatus, SnapshotCache};
pub use client::{parse_updown_slug, updown_slug, ClobClient};
pub use data_cache::{CacheStatus, DataCache, Scope, TickSnapshot};
pub use error::{FeedError, FeedResult};
pub use provider::{
    BoxFuture, DynMarketProvider, DynOrderbookProvider, MarketProvider, MarketQuery,
    MockMarketProvider, MockOrderbookProvider, OrderbookProvider,
};
