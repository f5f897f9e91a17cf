//! Structured logging initialization.
//!
//! Order flow (`hedge_engine`, `hedge_executor`) logs at debug by default.
//! The cache poller in `hedge_feed` runs every tick, so it stays at info
//! unless `RUST_LOG` asks for more. HTTP client internals are held at warn.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Per-target defaults, applied when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &[(&str, &str)] = &[
    ("hedge_bot", "info"),
    ("hedge_engine", "debug"),
    ("hedge_executor", "debug"),
    ("hedge_feed", "info"),
    ("hedge_ledger", "info"),
    ("hyper", "warn"),
    ("reqwest", "warn"),
];

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `HEDGE_LOG_FORMAT` (`json` or `pretty`) wins; otherwise JSON when
    /// `RUST_ENV=production`.
    pub fn select(format_var: Option<&str>, rust_env: Option<&str>) -> Self {
        match format_var.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Self::Json,
            Some("pretty") => Self::Pretty,
            _ if rust_env == Some("production") => Self::Json,
            _ => Self::Pretty,
        }
    }

    fn from_env() -> Self {
        let format_var = std::env::var("HEDGE_LOG_FORMAT").ok();
        let rust_env = std::env::var("RUST_ENV").ok();
        Self::select(format_var.as_deref(), rust_env.as_deref())
    }
}

/// Filter string used when `RUST_LOG` is unset.
pub fn default_filter() -> String {
    std::iter::once("warn".to_string())
        .chain(
            DEFAULT_DIRECTIVES
                .iter()
                .map(|(target, level)| format!("{target}={level}")),
        )
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize structured logging. `RUST_LOG` replaces the default filter.
pub fn init_logging() -> TelemetryResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));

    let result = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_covers_crates() {
        let filter = default_filter();
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("hedge_engine=debug"));
        assert!(filter.contains("hedge_executor=debug"));
        assert!(filter.contains("hedge_feed=info"));
        assert!(filter.contains("reqwest=warn"));
        assert!(filter.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_format_selection() {
        assert_eq!(LogFormat::select(None, None), LogFormat::Pretty);
        assert_eq!(LogFormat::select(None, Some("production")), LogFormat::Json);
        assert_eq!(LogFormat::select(Some("JSON"), None), LogFormat::Json);
        assert_eq!(
            LogFormat::select(Some("pretty"), Some("production")),
            LogFormat::Pretty
        );
        assert_eq!(LogFormat::select(Some("xml"), Some("staging")), LogFormat::Pretty);
    }
}
