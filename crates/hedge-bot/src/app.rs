//! Application wiring and main loop.

use crate::config::AppConfig;
use crate::error::AppResult;
use hedge_core::{DynClock, SystemClock};
use hedge_engine::{HedgeEngine, HedgeService};
use hedge_executor::{DynTradingClient, GatewayTradingClient};
use hedge_feed::{ClobClient, DataCache, DynMarketProvider, DynOrderbookProvider};
use hedge_ledger::{load_history, BookFilter, HistoryWriter, Ledger, PnlRange};
use hedge_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    service: HedgeService,
}

impl Application {
    /// Build the full stack. Performs no network I/O.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let clock: DynClock = Arc::new(SystemClock);

        let clob = Arc::new(ClobClient::new(
            config.clob_url.as_str(),
            config.gamma_url.as_str(),
            Arc::clone(&clock),
        )?);
        let market_provider: DynMarketProvider = clob.clone();
        let book_provider: DynOrderbookProvider = clob;
        let data = Arc::new(DataCache::new(
            config.cache.clone().normalized(),
            config.hedge.symbols.clone(),
            market_provider,
            book_provider,
            Arc::clone(&clock),
        ));

        let api_key = config.trading.api_key();
        if !config.is_paper() && api_key.is_none() {
            warn!(
                env = %config.trading.api_key_env,
                "Gateway API key not set, orders go out unauthenticated"
            );
        }
        let live_client: DynTradingClient = Arc::new(GatewayTradingClient::new(
            config.trading.gateway_url.as_str(),
            api_key,
        )?);

        let ledger = Arc::new(Self::open_ledger(&config)?);

        let engine = Arc::new(HedgeEngine::new(
            config.hedge.clone(),
            data,
            live_client,
            ledger,
            clock,
            Duration::from_millis(config.trading.order_timeout_ms),
        ));

        info!(
            mode = ?config.trading.mode,
            clob_url = %config.clob_url,
            history_dir = ?config.history.dir,
            "Application initialized"
        );

        Ok(Self {
            config,
            service: HedgeService::new(engine),
        })
    }

    fn open_ledger(config: &AppConfig) -> AppResult<Ledger> {
        let ledger = Ledger::new(config.history.max_entries);
        let Some(dir) = config.history.dir.as_deref() else {
            return Ok(ledger);
        };

        let events = load_history(dir)?;
        info!(dir, events = events.len(), "History restored");
        ledger.restore(events);

        let writer = HistoryWriter::new(dir, config.history.max_buffer_size)?;
        Ok(ledger.with_writer(writer))
    }

    pub fn service(&self) -> &HedgeService {
        &self.service
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> AppResult<()> {
        let config = self.service.start(None);
        info!(
            poll_ms = config.poll_ms,
            sim = config.sim.enabled,
            "Hedge engine running"
        );

        let mut status_interval =
            tokio::time::interval(Duration::from_secs(self.config.status_interval_secs));
        // The first tick fires immediately.
        status_interval.tick().await;

        loop {
            tokio::select! {
                _ = status_interval.tick() => {
                    self.report_status();
                    self.write_metrics();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.service.stop();
        self.write_metrics();

        let pnl = self.service.get_pnl(PnlRange::All, BookFilter::Any);
        info!(
            trades = pnl.trades,
            wins = pnl.wins,
            losses = pnl.losses,
            realized_pnl_usd = %pnl.realized_pnl_usd,
            "Shutdown complete"
        );
        Ok(())
    }

    fn report_status(&self) {
        let status = self.service.get_status();
        let pnl = self.service.get_pnl(PnlRange::Day, BookFilter::Any);

        info!(
            scheduler = ?status.scheduler,
            markets = status.markets.len(),
            positions = status.positions.len(),
            held_locks = status.held_locks.len(),
            day_trades = pnl.trades,
            day_pnl_usd = %pnl.realized_pnl_usd,
            "Status"
        );
        if status.sim.enabled {
            info!(
                cash_usdc = %status.sim.cash_usdc,
                equity_usdc = %status.sim.equity_usdc,
                pnl_usdc = %status.sim.pnl_usdc,
                "Simulated book"
            );
        }
        if let Some(tick) = status.last_tick {
            debug!(
                at_ms = tick.at_ms,
                duration_ms = tick.duration_ms,
                orders = tick.orders,
                skipped = tick.skipped,
                stale = tick.stale,
                errors = tick.errors.len(),
                "Last tick"
            );
        }
    }

    fn write_metrics(&self) {
        let Some(path) = self.config.metrics_file.as_deref() else {
            return;
        };
        let result = Metrics::render()
            .map_err(|e| e.to_string())
            .and_then(|text| std::fs::write(path, text).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(path, error = %e, "Failed to write metrics file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedge_engine::SchedulerState;
    use hedge_ledger::{HistoryAction, HistoryEvent, HistoryFilter, HistoryStatus};

    #[test]
    fn test_new_paper_application() {
        let config = AppConfig::from_toml("").unwrap();
        let app = Application::new(config).unwrap();

        let status = app.service().get_status();
        assert_eq!(status.scheduler, SchedulerState::Stopped);
        assert!(status.sim.enabled);
        assert!(status.positions.is_empty());
    }

    #[test]
    fn test_history_restored_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();
        {
            let mut writer = HistoryWriter::new(&dir_str, 10).unwrap();
            writer
                .add_record(
                    HistoryEvent::new(
                        1_000,
                        HistoryAction::Entry,
                        HistoryStatus::Skipped,
                        "BTC",
                        hedge_core::ConditionId::from("0xabc"),
                        true,
                    )
                    .with_outcome("Up")
                    .with_reason("spread"),
                )
                .unwrap();
            writer.flush().unwrap();
        }

        let toml = format!("[history]\ndir = {dir_str:?}\n");
        let config = AppConfig::from_toml(&toml).unwrap();
        let app = Application::new(config).unwrap();

        let history = app.service().get_history(&HistoryFilter::default());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].condition_id, hedge_core::ConditionId::from("0xabc"));
    }

    #[test]
    fn test_metrics_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        let mut config = AppConfig::default();
        config.metrics_file = Some(path.to_str().unwrap().to_string());

        let app = Application::new(config).unwrap();
        Metrics::skip("entry", "spread");
        app.write_metrics();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("hedge_skips_total"));
    }
}
