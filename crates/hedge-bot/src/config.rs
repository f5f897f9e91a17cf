//! Application configuration.
//!
//! Loaded from a single TOML file. Every section has defaults, so an empty
//! file runs a paper-trading engine against the public endpoints.

use crate::error::{AppError, AppResult};
use hedge_engine::HedgeConfig;
use hedge_feed::CacheConfig;
use serde::{Deserialize, Serialize};

/// Where orders are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Every order goes to the simulated book.
    #[default]
    Paper,
    /// Live orders go to the signing gateway.
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default)]
    pub mode: TradingMode,
    /// Order gateway base URL (gateway mode).
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Name of the env var holding the gateway API key. The key itself
    /// never lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Upper bound on a single order submission.
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_api_key_env() -> String {
    "HEDGE_GATEWAY_API_KEY".to_string()
}

fn default_order_timeout_ms() -> u64 {
    20_000
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::default(),
            gateway_url: default_gateway_url(),
            api_key_env: default_api_key_env(),
            order_timeout_ms: default_order_timeout_ms(),
        }
    }
}

impl TradingConfig {
    /// Read the gateway API key from the configured env var, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

/// History persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSONL directory. History stays in memory only when unset.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    /// In-memory retention.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_buffer_size() -> usize {
    100
}

fn default_max_entries() -> usize {
    hedge_ledger::DEFAULT_MAX_ENTRIES
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_buffer_size: default_max_buffer_size(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// CLOB REST endpoint (markets and books).
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    /// Gamma REST endpoint (up/down market discovery).
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// Status log period (seconds).
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    /// Prometheus text dump, rewritten every status period.
    #[serde(default)]
    pub metrics_file: Option<String>,
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_status_interval_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            clob_url: default_clob_url(),
            gamma_url: default_gamma_url(),
            cache: CacheConfig::default(),
            hedge: HedgeConfig::default(),
            trading: TradingConfig::default(),
            history: HistoryConfig::default(),
            status_interval_secs: default_status_interval_secs(),
            metrics_file: None,
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        if config.is_paper() {
            config.hedge.sim.enabled = true;
        }
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.status_interval_secs == 0 {
            return Err(AppError::Config(
                "status_interval_secs must be positive".to_string(),
            ));
        }
        if self.trading.order_timeout_ms == 0 {
            return Err(AppError::Config(
                "trading.order_timeout_ms must be positive".to_string(),
            ));
        }
        if self.trading.mode == TradingMode::Gateway && self.trading.gateway_url.is_empty() {
            return Err(AppError::Config(
                "trading.gateway_url is required in gateway mode".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_paper(&self) -> bool {
        self.trading.mode == TradingMode::Paper
    }
}
