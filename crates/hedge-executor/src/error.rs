//! Executor error types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Trading client and execution errors.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("Order submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Insufficient shares: need {needed}, have {available}")]
    InsufficientShares { needed: Decimal, available: Decimal },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
