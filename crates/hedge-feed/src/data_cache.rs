//! Market and order book cache keyed by scope.
//!
//! Two slot families (market lists and books) run the same
//! [`SnapshotCache`] algorithm. A tick asks for one [`TickSnapshot`]: the
//! market list first, then books for every outcome token of those markets,
//! so all decisions in the tick see the same prices.

use crate::cache::{CacheConfig, CacheRead, SlotStatus, SnapshotCache};
use crate::error::{FeedError, FeedResult};
use crate::provider::{DynMarketProvider, DynOrderbookProvider, MarketQuery};
use hedge_core::{BookSet, ConditionId, DynClock, MarketInfo, MarketSnapshot, Timeframe, TokenId};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Cache scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// One symbol, one timeframe.
    Pair { symbol: String, timeframe: Timeframe },
    /// Every configured symbol, every timeframe.
    All,
    /// Every configured symbol, one timeframe.
    Timeframe(Timeframe),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair { symbol, timeframe } => write!(f, "{symbol}:{timeframe}"),
            Self::All => write!(f, "all"),
            Self::Timeframe(tf) => write!(f, "all:{tf}"),
        }
    }
}

/// Consistent view of one scope for a tick.
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    pub scope: Scope,
    pub markets: Arc<Vec<MarketSnapshot>>,
    pub books: Arc<BookSet>,
    pub markets_stale: bool,
    pub books_stale: bool,
    pub errors: Vec<String>,
}

/// Per-slot diagnostics for both families.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub markets: Vec<(String, SlotStatus)>,
    pub books: Vec<(String, SlotStatus)>,
}

/// Scoped market/book cache service.
pub struct DataCache {
    markets: SnapshotCache<Scope, Arc<Vec<MarketSnapshot>>>,
    books: SnapshotCache<Scope, Arc<BookSet>>,
    market_provider: DynMarketProvider,
    book_provider: DynOrderbookProvider,
    symbols: RwLock<Vec<String>>,
}

impl DataCache {
    #[must_use]
    pub fn new(
        config: CacheConfig,
        symbols: Vec<String>,
        market_provider: DynMarketProvider,
        book_provider: DynOrderbookProvider,
        clock: DynClock,
    ) -> Self {
        Self {
            markets: SnapshotCache::new("markets", config.clone(), Arc::clone(&clock)),
            books: SnapshotCache::new("books", config, clock),
            market_provider,
            book_provider,
            symbols: RwLock::new(normalize_symbols(symbols)),
        }
    }

    /// Replace the symbol universe used by `All` and `Timeframe` scopes.
    pub fn set_symbols(&self, symbols: Vec<String>) {
        *self.symbols.write() = normalize_symbols(symbols);
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.read().clone()
    }

    pub fn query_for(&self, scope: &Scope) -> MarketQuery {
        match scope {
            Scope::Pair { symbol, timeframe } => MarketQuery {
                symbols: vec![symbol.to_ascii_uppercase()],
                timeframes: vec![*timeframe],
            },
            Scope::All => MarketQuery {
                symbols: self.symbols(),
                timeframes: Timeframe::ALL.to_vec(),
            },
            Scope::Timeframe(tf) => MarketQuery {
                symbols: self.symbols(),
                timeframes: vec![*tf],
            },
        }
    }

    /// Market list for a scope.
    pub async fn markets(&self, scope: &Scope) -> CacheRead<Arc<Vec<MarketSnapshot>>> {
        let provider = Arc::clone(&self.market_provider);
        let query = self.query_for(scope);
        self.markets
            .get(scope.clone(), move || async move {
                provider.list_markets(&query).await.map(Arc::new)
            })
            .await
    }

    /// Books for a scope. The token set is chosen by the caller.
    pub async fn books(&self, scope: &Scope, token_ids: Vec<TokenId>) -> CacheRead<Arc<BookSet>> {
        let provider = Arc::clone(&self.book_provider);
        self.books
            .get(scope.clone(), move || async move {
                if token_ids.is_empty() {
                    return Ok(Arc::new(BookSet::new()));
                }
                let books = provider.get_books(&token_ids).await?;
                Ok::<_, FeedError>(Arc::new(books.into_iter().collect::<BookSet>()))
            })
            .await
    }

    /// Markets, then books for every outcome token of those markets.
    pub async fn snapshot(&self, scope: &Scope) -> TickSnapshot {
        let mut errors = Vec::new();

        let markets_read = self.markets(scope).await;
        if let Some(e) = &markets_read.last_error {
            errors.push(format!("markets: {e}"));
        }
        let markets = markets_read.snapshot.unwrap_or_default();

        let token_ids: Vec<TokenId> = markets.iter().flat_map(|m| m.token_ids()).collect();
        let books_read = self.books(scope, token_ids).await;
        if let Some(e) = &books_read.last_error {
            errors.push(format!("books: {e}"));
        }

        TickSnapshot {
            scope: scope.clone(),
            markets,
            books: books_read.snapshot.unwrap_or_default(),
            markets_stale: markets_read.stale,
            books_stale: books_read.stale,
            errors,
        }
    }

    /// Uncached single-market lookup.
    pub async fn market_info(&self, condition_id: &ConditionId) -> FeedResult<MarketInfo> {
        self.market_provider.get_market(condition_id).await
    }

    /// Uncached book lookup for a handful of tokens.
    pub async fn books_for(&self, token_ids: &[TokenId]) -> FeedResult<BookSet> {
        let books = self.book_provider.get_books(token_ids).await?;
        Ok(books.into_iter().collect())
    }

    pub fn status(&self) -> CacheStatus {
        let label = |slots: Vec<(Scope, SlotStatus)>| {
            let mut out: Vec<(String, SlotStatus)> =
                slots.into_iter().map(|(s, st)| (s.to_string(), st)).collect();
            out.sort_by(|a, b| a.0.cmp(&b.0));
            out
        };
        CacheStatus {
            markets: label(self.markets.status()),
            books: label(self.books.status()),
        }
    }
}

fn normalize_symbols(symbols: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = symbols
        .into_iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.dedup();
    out
}
