//! Feed error types.

use thiserror::Error;

/// Feed errors.
///
/// `Clone` because one fetch result is shared by every coalesced caller.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Market not found: {0}")]
    MarketNotFound(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Fetch timed out after {0}ms")]
    Timeout(u64),

    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
