//! Upstream data provider traits.
//!
//! The market and order book APIs are external collaborators. They are
//! consumed through these dyn-compatible traits so the cache and the engine
//! can be driven by the HTTP client in production and by mocks in tests.

use crate::error::{FeedError, FeedResult};
pub use hedge_core::BoxFuture;
use hedge_core::{BookSnapshot, ConditionId, MarketInfo, MarketSnapshot, Timeframe, TokenId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Market list query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketQuery {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
}

impl MarketQuery {
    pub fn matches(&self, market: &MarketSnapshot) -> bool {
        self.timeframes.contains(&market.timeframe)
            && self
                .symbols
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&market.symbol))
    }
}

/// Market metadata source.
pub trait MarketProvider: Send + Sync {
    /// Look up a single market by condition id.
    fn get_market(&self, condition_id: &ConditionId) -> BoxFuture<'_, FeedResult<MarketInfo>>;

    /// List the live markets matching a query.
    fn list_markets(&self, query: &MarketQuery) -> BoxFuture<'_, FeedResult<Vec<MarketSnapshot>>>;
}

/// Order book source.
pub trait OrderbookProvider: Send + Sync {
    /// Fetch books for the given tokens. Tokens without a book are omitted.
    fn get_books(&self, token_ids: &[TokenId]) -> BoxFuture<'_, FeedResult<Vec<BookSnapshot>>>;
}

pub type DynMarketProvider = Arc<dyn MarketProvider>;
pub type DynOrderbookProvider = Arc<dyn OrderbookProvider>;

// ============================================================================
// Mocks
// ============================================================================

/// In-memory market provider for testing.
#[derive(Debug, Default)]
pub struct MockMarketProvider {
    markets: Mutex<Vec<MarketSnapshot>>,
    infos: Mutex<HashMap<ConditionId, MarketInfo>>,
    failure: Mutex<Option<FeedError>>,
    latency: Mutex<Duration>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MockMarketProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_markets(&self, markets: Vec<MarketSnapshot>) {
        *self.markets.lock() = markets;
    }

    pub fn insert_info(&self, info: MarketInfo) {
        self.infos.lock().insert(info.condition_id.clone(), info);
    }

    /// Fail every call with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<FeedError>) {
        *self.failure.lock() = error;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl MarketProvider for MockMarketProvider {
    fn get_market(&self, condition_id: &ConditionId) -> BoxFuture<'_, FeedResult<MarketInfo>> {
        let condition_id = condition_id.clone();
        Box::pin(async move {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            let latency = *self.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(err) = self.failure.lock().clone() {
                return Err(err);
            }
            self.infos
                .lock()
                .get(&condition_id)
                .cloned()
                .ok_or_else(|| FeedError::MarketNotFound(condition_id.to_string()))
        })
    }

    fn list_markets(&self, query: &MarketQuery) -> BoxFuture<'_, FeedResult<Vec<MarketSnapshot>>> {
        let query = query.clone();
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let latency = *self.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(err) = self.failure.lock().clone() {
                return Err(err);
            }
            Ok(self
                .markets
                .lock()
                .iter()
                .filter(|m| query.matches(m))
                .cloned()
                .collect())
        })
    }
}

/// In-memory order book provider for testing.
#[derive(Debug, Default)]
pub struct MockOrderbookProvider {
    books: Mutex<HashMap<TokenId, BookSnapshot>>,
    failure: Mutex<Option<FeedError>>,
    latency: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockOrderbookProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_book(&self, book: BookSnapshot) {
        self.books.lock().insert(book.token_id.clone(), book);
    }

    pub fn set_failure(&self, error: Option<FeedError>) {
        *self.failure.lock() = error;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OrderbookProvider for MockOrderbookProvider {
    fn get_books(&self, token_ids: &[TokenId]) -> BoxFuture<'_, FeedResult<Vec<BookSnapshot>>> {
        let token_ids = token_ids.to_vec();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let latency = *self.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(err) = self.failure.lock().clone() {
                return Err(err);
            }
            let books = self.books.lock();
            Ok(token_ids
                .iter()
                .filter_map(|id| books.get(id).cloned())
                .collect())
        })
    }
}
