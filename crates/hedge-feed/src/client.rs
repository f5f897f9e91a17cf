//! HTTP client for the market metadata and order book APIs.
//!
//! - Gamma: recurring up/down markets are discovered by slug
//!   (`{symbol}-updown-{timeframe}-{window_start}`).
//! - CLOB: single-market lookup (`GET /markets/{condition_id}`) and batched
//!   books (`POST /books`).
//!
//! Responses are parsed through `serde_json::Value`; records missing
//! required fields are skipped with a debug log.

use crate::error::{FeedError, FeedResult};
use crate::provider::{BoxFuture, MarketProvider, MarketQuery, OrderbookProvider};
use hedge_core::{
    BookSnapshot, ConditionId, DynClock, MarketInfo, MarketSnapshot, OutcomeToken, Timeframe,
    TokenId,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeframes whose markets follow the `{symbol}-updown-{tf}-{start}` slug.
const SLUG_TIMEFRAMES: [Timeframe; 2] = [Timeframe::M5, Timeframe::M15];

#[derive(Debug, Serialize)]
struct BookRequest<'a> {
    token_id: &'a str,
}

/// Client for market metadata and order books.
pub struct ClobClient {
    client: Client,
    clob_url: String,
    gamma_url: String,
    clock: DynClock,
}

impl ClobClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `clob_url` - CLOB REST base URL
    /// * `gamma_url` - Gamma REST base URL
    pub fn new(
        clob_url: impl Into<String>,
        gamma_url: impl Into<String>,
        clock: DynClock,
    ) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FeedError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            clob_url: clob_url.into().trim_end_matches('/').to_string(),
            gamma_url: gamma_url.into().trim_end_matches('/').to_string(),
            clock,
        })
    }

    async fn get_json(&self, url: &str) -> FeedResult<Option<Value>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Upstream(format!("HTTP {status}: {body}")));
        }

        let body = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(format!("Failed to parse response: {e}")))?;
        Ok(Some(body))
    }

    async fn fetch_market(&self, condition_id: &ConditionId) -> FeedResult<MarketInfo> {
        let url = format!("{}/markets/{}", self.clob_url, condition_id);
        let body = self
            .get_json(&url)
            .await?
            .ok_or_else(|| FeedError::MarketNotFound(condition_id.to_string()))?;
        parse_clob_market(&body)
            .ok_or_else(|| FeedError::Parse(format!("Malformed market {condition_id}")))
    }

    async fn fetch_markets(&self, query: &MarketQuery) -> FeedResult<Vec<MarketSnapshot>> {
        let now_ms = self.clock.now_ms();
        let mut markets = Vec::new();
        let mut first_error = None;

        for tf in &query.timeframes {
            if !SLUG_TIMEFRAMES.contains(tf) {
                debug!(timeframe = %tf, "No slug discovery for timeframe, skipping");
                continue;
            }
            for symbol in &query.symbols {
                for window_start in window_starts(*tf, now_ms) {
                    let slug = updown_slug(symbol, *tf, window_start);
                    let url = format!("{}/events/slug/{}", self.gamma_url, slug);
                    match self.get_json(&url).await {
                        Ok(Some(event)) => {
                            markets.extend(parse_gamma_event(&event, symbol, *tf, now_ms));
                        }
                        Ok(None) => debug!(slug = %slug, "Market not listed yet"),
                        Err(e) => {
                            warn!(slug = %slug, error = %e, "Market lookup failed");
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) if markets.is_empty() => Err(e),
            _ => {
                info!(count = markets.len(), "Fetched up/down markets");
                Ok(markets)
            }
        }
    }

    async fn fetch_books(&self, token_ids: &[TokenId]) -> FeedResult<Vec<BookSnapshot>> {
        let url = format!("{}/books", self.clob_url);
        let request: Vec<BookRequest<'_>> = token_ids
            .iter()
            .map(|t| BookRequest {
                token_id: t.as_str(),
            })
            .collect();

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FeedError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Upstream(format!("HTTP {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(format!("Failed to parse response: {e}")))?;

        Ok(body
            .as_array()
            .map(|arr| arr.iter().filter_map(BookSnapshot::from_json).collect())
            .unwrap_or_default())
    }
}

impl MarketProvider for ClobClient {
    fn get_market(&self, condition_id: &ConditionId) -> BoxFuture<'_, FeedResult<MarketInfo>> {
        let condition_id = condition_id.clone();
        Box::pin(async move { self.fetch_market(&condition_id).await })
    }

    fn list_markets(&self, query: &MarketQuery) -> BoxFuture<'_, FeedResult<Vec<MarketSnapshot>>> {
        let query = query.clone();
        Box::pin(async move { self.fetch_markets(&query).await })
    }
}

impl OrderbookProvider for ClobClient {
    fn get_books(&self, token_ids: &[TokenId]) -> BoxFuture<'_, FeedResult<Vec<BookSnapshot>>> {
        let token_ids = token_ids.to_vec();
        Box::pin(async move { self.fetch_books(&token_ids).await })
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Slug of a recurring up/down market window.
pub fn updown_slug(symbol: &str, timeframe: Timeframe, window_start_secs: u64) -> String {
    format!(
        "{}-updown-{}-{}",
        symbol.to_ascii_lowercase(),
        timeframe,
        window_start_secs
    )
}

/// Parse `{symbol}-updown-{tf}-{start}` back into its parts.
pub fn parse_updown_slug(slug: &str) -> Option<(String, Timeframe, u64)> {
    let mut parts = slug.split('-');
    let symbol = parts.next()?;
    if parts.next()? != "updown" {
        return None;
    }
    let timeframe = parts.next()?.parse().ok()?;
    let start = parts.next()?.parse().ok()?;
    if parts.next().is_some() || symbol.is_empty() {
        return None;
    }
    Some((symbol.to_ascii_uppercase(), timeframe, start))
}

/// Current and next window starts for a timeframe.
fn window_starts(timeframe: Timeframe, now_ms: u64) -> [u64; 2] {
    let dur = timeframe.duration_secs();
    let current = (now_ms / 1000) / dur * dur;
    [current, current + dur]
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Gamma encodes some arrays as JSON strings (`"[\"Up\",\"Down\"]"`).
fn string_list(value: Option<&Value>) -> Vec<String> {
    let decoded;
    let arr = match value {
        Some(Value::Array(arr)) => arr,
        Some(Value::String(s)) => {
            decoded = serde_json::from_str::<Value>(s).unwrap_or(Value::Null);
            match decoded.as_array() {
                Some(arr) => arr,
                None => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };
    arr.iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn parse_iso_ms(s: &str) -> Option<u64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
        .filter(|ms| *ms >= 0)
        .map(|ms| ms as u64)
}

/// Parse a CLOB `/markets/{id}` body.
pub fn parse_clob_market(value: &Value) -> Option<MarketInfo> {
    let condition_id = str_field(value, &["condition_id", "conditionId"])?;
    let tokens: Vec<OutcomeToken> = value
        .get("tokens")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|t| {
            let token_id = str_field(t, &["token_id", "tokenId"])?;
            let outcome = str_field(t, &["outcome"]).unwrap_or("");
            Some(OutcomeToken::new(outcome, token_id))
        })
        .collect();
    let end_time_ms = str_field(value, &["end_date_iso", "endDateIso"]).and_then(parse_iso_ms)?;
    let slug = str_field(value, &["market_slug", "marketSlug"]).and_then(parse_updown_slug);

    Some(MarketInfo {
        condition_id: ConditionId::new(condition_id),
        tokens,
        end_time_ms,
        symbol: slug.as_ref().map(|(s, _, _)| s.clone()),
        timeframe: slug.map(|(_, tf, _)| tf),
    })
}

/// Parse a Gamma event body into market snapshots.
pub fn parse_gamma_event(
    event: &Value,
    symbol: &str,
    timeframe: Timeframe,
    now_ms: u64,
) -> Vec<MarketSnapshot> {
    let Some(markets) = event.get("markets").and_then(Value::as_array) else {
        return Vec::new();
    };
    markets
        .iter()
        .filter_map(|m| {
            let parsed = parse_gamma_market(m, symbol, timeframe, now_ms);
            if parsed.is_none() {
                debug!(symbol, timeframe = %timeframe, "Skipping malformed gamma market");
            }
            parsed
        })
        .collect()
}

fn parse_gamma_market(
    market: &Value,
    symbol: &str,
    timeframe: Timeframe,
    now_ms: u64,
) -> Option<MarketSnapshot> {
    if market.get("closed").and_then(Value::as_bool) == Some(true) {
        return None;
    }
    let condition_id = str_field(market, &["conditionId", "condition_id"])?;
    let token_ids = string_list(market.get("clobTokenIds"));
    let outcomes = string_list(market.get("outcomes"));
    if token_ids.len() != 2 {
        return None;
    }
    let outcome = |i: usize, fallback: &str| {
        outcomes
            .get(i)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    };
    let end_time_ms = str_field(market, &["endDate", "end_date_iso"]).and_then(parse_iso_ms)?;

    Some(MarketSnapshot::new(
        ConditionId::new(condition_id),
        symbol.to_ascii_uppercase(),
        timeframe,
        [
            OutcomeToken::new(outcome(0, "Up"), token_ids[0].clone()),
            OutcomeToken::new(outcome(1, "Down"), token_ids[1].clone()),
        ],
        end_time_ms,
        now_ms,
    ))
}
