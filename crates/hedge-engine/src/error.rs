//! Engine error types.

use hedge_core::CoreError;
use hedge_feed::FeedError;
use hedge_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Market error: {0}")]
    Core(#[from] CoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("No liquidity for {0}")]
    NoLiquidity(String),

    #[error("Invalid outcome index: {0}")]
    InvalidOutcome(usize),

    #[error("Market expired: {0}")]
    MarketExpired(String),

    #[error("Engine not running")]
    NotRunning,
}

pub type EngineResult<T> = Result<T, EngineError>;
