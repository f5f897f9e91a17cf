//! Prometheus metrics and structured logging for the hedge engine.
//!
//! - Prometheus metrics for orders, skips, cache health and ledger equity
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{default_filter, init_logging, LogFormat};
pub use metrics::Metrics;
