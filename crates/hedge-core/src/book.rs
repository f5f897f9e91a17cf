//! Order book snapshots.
//!
//! Upstream books arrive as loosely typed JSON where prices and sizes may be
//! strings or numbers, and bid levels sometimes omit the size. Levels that
//! cannot be read as finite, positive decimals are dropped, never turned
//! into errors.

use crate::{Price, Size, TokenId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Size,
}

impl BookLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }

    /// Parse `{price, size}`. A missing size is read as zero.
    pub fn from_json(value: &Value) -> Option<Self> {
        let price = parse_decimal(value.get("price")?)?;
        let size = match value.get("size") {
            Some(v) => parse_decimal(v)?,
            None => Decimal::ZERO,
        };
        Some(Self::new(Price::new(price), Size::new(size)))
    }

    pub fn notional(&self) -> Decimal {
        self.size.notional(self.price)
    }
}

/// Read a decimal from a JSON string or number.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        Value::Number(n) => {
            let s = n.to_string();
            s.parse::<Decimal>()
                .ok()
                .or_else(|| Decimal::from_scientific(&s).ok())
        }
        _ => None,
    }
}

/// Book for one outcome token. Bids are sorted descending, asks ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub token_id: TokenId,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSnapshot {
    /// Build a normalized book. Bids need a positive price; asks need a
    /// positive price and size.
    #[must_use]
    pub fn new(token_id: TokenId, mut bids: Vec<BookLevel>, mut asks: Vec<BookLevel>) -> Self {
        bids.retain(|l| l.price.is_positive() && !l.size.0.is_sign_negative());
        asks.retain(|l| l.price.is_positive() && l.size.is_positive());
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self {
            token_id,
            bids,
            asks,
        }
    }

    /// Parse `{asset_id, bids: [...], asks: [...]}`. Returns `None` when the
    /// token id is missing.
    pub fn from_json(value: &Value) -> Option<Self> {
        let token_id = match value.get("asset_id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let levels = |key: &str| -> Vec<BookLevel> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(BookLevel::from_json).collect())
                .unwrap_or_default()
        };
        Some(Self::new(TokenId::new(token_id), levels("bids"), levels("asks")))
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// Best ask minus best bid, in cents.
    pub fn spread_cents(&self) -> Option<Decimal> {
        Some((self.best_ask()? - self.best_bid()?).cents())
    }
}

/// Books of a tick, indexed by token id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSet {
    books: HashMap<TokenId, BookSnapshot>,
}

impl BookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, book: BookSnapshot) {
        self.books.insert(book.token_id.clone(), book);
    }

    pub fn get(&self, token_id: &TokenId) -> Option<&BookSnapshot> {
        self.books.get(token_id)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookSnapshot> {
        self.books.values()
    }
}

impl FromIterator<BookSnapshot> for BookSet {
    fn from_iter<I: IntoIterator<Item = BookSnapshot>>(iter: I) -> Self {
        let mut set = Self::new();
        for book in iter {
            set.insert(book);
        }
        set
    }
}
