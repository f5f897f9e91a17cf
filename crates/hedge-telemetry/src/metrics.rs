//! Prometheus metrics for the hedge engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a startup configuration bug. These panics
//! only occur during static initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, Histogram, IntGauge, TextEncoder,
};

/// Orders submitted, by leg and outcome (filled/failed/timed_out).
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hedge_orders_total",
        "Total order attempts by leg and outcome",
        &["leg", "outcome", "book"]
    )
    .unwrap()
});

/// Evaluations that did not place an order, by reason.
pub static SKIPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hedge_skips_total",
        "Total skipped order attempts by leg and reason",
        &["leg", "reason"]
    )
    .unwrap()
});

/// Upstream fetches issued by the data cache.
pub static CACHE_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hedge_cache_fetch_total",
        "Upstream fetches issued by the data cache",
        &["cache", "result"]
    )
    .unwrap()
});

/// Cache reads served from a coalesced in-flight fetch or the backoff gate.
pub static CACHE_SERVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hedge_cache_served_total",
        "Cache reads served without a new fetch",
        &["cache", "via"]
    )
    .unwrap()
});

/// Current backoff per cache slot.
pub static CACHE_BACKOFF_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "hedge_cache_backoff_ms",
        "Current backoff delay per cache slot",
        &["cache", "scope"]
    )
    .unwrap()
});

/// Execution locks force-released after the hold timeout.
pub static LOCK_TIMEOUTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hedge_lock_timeouts_total",
        "Execution locks force-released after the hold timeout",
        &["leg"]
    )
    .unwrap()
});

/// Tick evaluation duration.
pub static TICK_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "hedge_tick_duration_ms",
        "Duration of one evaluation tick in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Currently tracked positions.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("hedge_open_positions", "Currently tracked positions").unwrap()
});

/// Simulated book equity in USDC.
pub static SIM_EQUITY_USDC: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("hedge_sim_equity_usdc", "Simulated book equity in USDC").unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Record an order attempt.
    pub fn order(leg: &str, outcome: &str, simulated: bool) {
        let book = if simulated { "sim" } else { "real" };
        ORDERS_TOTAL.with_label_values(&[leg, outcome, book]).inc();
    }

    /// Record a skipped attempt.
    pub fn skip(leg: &str, reason: &str) {
        SKIPS_TOTAL.with_label_values(&[leg, reason]).inc();
    }

    /// Record an upstream cache fetch.
    pub fn cache_fetch(cache: &str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        CACHE_FETCH_TOTAL.with_label_values(&[cache, result]).inc();
    }

    /// Record a read that joined an in-flight fetch.
    pub fn cache_coalesced(cache: &str) {
        CACHE_SERVED_TOTAL
            .with_label_values(&[cache, "coalesced"])
            .inc();
    }

    /// Record a read served from the slot while gated.
    pub fn cache_gated(cache: &str) {
        CACHE_SERVED_TOTAL.with_label_values(&[cache, "gated"]).inc();
    }

    pub fn cache_backoff(cache: &str, scope: &str, backoff_ms: u64) {
        CACHE_BACKOFF_MS
            .with_label_values(&[cache, scope])
            .set(backoff_ms as f64);
    }

    pub fn lock_timeout(leg: &str) {
        LOCK_TIMEOUTS_TOTAL.with_label_values(&[leg]).inc();
    }

    pub fn tick_duration(duration_ms: f64) {
        TICK_DURATION_MS.observe(duration_ms);
    }

    pub fn open_positions(count: usize) {
        OPEN_POSITIONS.set(count as i64);
    }

    pub fn sim_equity(equity_usdc: f64) {
        SIM_EQUITY_USDC.set(equity_usdc);
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
