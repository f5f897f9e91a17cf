//! Ledger error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown PnL range: {0}")]
    UnknownRange(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
