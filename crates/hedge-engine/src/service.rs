//! Control surface: scheduler lifecycle, status, history and manual entry.

use crate::config::{ConfigPatch, HedgeConfig};
use crate::engine::{HedgeEngine, ManualEntry, MarketStatus, SimStatus, TickSummary};
use crate::error::{EngineError, EngineResult};
use crate::position::ActivePosition;
use crate::scheduler::{Scheduler, SchedulerState};
use hedge_executor::HeldLock;
use hedge_feed::CacheStatus;
use hedge_ledger::{BookFilter, HistoryEvent, HistoryFilter, PnlRange, PnlReport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Full engine status.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub scheduler: SchedulerState,
    pub config: HedgeConfig,
    pub markets: Vec<MarketStatus>,
    pub positions: Vec<ActivePosition>,
    pub sim: SimStatus,
    pub cache: CacheStatus,
    pub held_locks: Vec<HeldLock>,
    pub last_tick: Option<TickSummary>,
}

pub struct HedgeService {
    engine: Arc<HedgeEngine>,
    scheduler: Scheduler,
}

impl HedgeService {
    pub fn new(engine: Arc<HedgeEngine>) -> Self {
        Self {
            engine,
            scheduler: Scheduler::new(),
        }
    }

    pub fn engine(&self) -> &Arc<HedgeEngine> {
        &self.engine
    }

    /// Apply `patch` (if any) and start ticking at `poll_ms`. Starting a
    /// running service only applies the patch.
    pub fn start(&self, patch: Option<ConfigPatch>) -> HedgeConfig {
        let config = match patch {
            Some(patch) => self.update_config(patch),
            None => self.engine.config(),
        };
        if self.spawn_scheduler(config.poll_ms, false) {
            info!(
                symbols = ?config.symbols,
                timeframes = ?config.timeframes,
                sim = config.sim.enabled,
                "Hedge service started"
            );
        }
        config
    }

    fn spawn_scheduler(&self, poll_ms: u64, suspended: bool) -> bool {
        let engine = Arc::clone(&self.engine);
        let tick = move || {
            let engine = Arc::clone(&engine);
            async move {
                engine.tick().await;
            }
        };
        let period = Duration::from_millis(poll_ms);
        if suspended {
            self.scheduler.start_suspended(period, tick)
        } else {
            self.scheduler.start(period, tick)
        }
    }

    /// Stop ticking and flush history. In-flight orders finish.
    pub fn stop(&self) {
        if self.scheduler.stop() {
            info!("Hedge service stopped");
        }
        self.engine.ledger().flush();
    }

    pub fn suspend(&self) -> EngineResult<()> {
        if self.scheduler.suspend() {
            Ok(())
        } else {
            Err(EngineError::NotRunning)
        }
    }

    pub fn resume(&self) -> EngineResult<()> {
        if self.scheduler.resume() {
            Ok(())
        } else {
            Err(EngineError::NotRunning)
        }
    }

    pub fn get_status(&self) -> EngineStatus {
        EngineStatus {
            scheduler: self.scheduler.state(),
            config: self.engine.config(),
            markets: self.engine.markets(),
            positions: self.engine.positions(),
            sim: self.engine.sim_status(),
            cache: self.engine.cache_status(),
            held_locks: self.engine.held_locks(),
            last_tick: self.engine.last_tick(),
        }
    }

    pub fn get_history(&self, filter: &HistoryFilter) -> Vec<HistoryEvent> {
        self.engine.ledger().get_history(filter)
    }

    /// Apply a partial config update. A running scheduler is restarted when
    /// the tick period changes; a suspended one stays suspended.
    pub fn update_config(&self, patch: ConfigPatch) -> HedgeConfig {
        let config = self.engine.update_config(patch);
        let period = Duration::from_millis(config.poll_ms);
        if let Some(current) = self.scheduler.period() {
            if current != period {
                let was_suspended = self.scheduler.state() == SchedulerState::Suspended;
                self.scheduler.stop();
                self.spawn_scheduler(config.poll_ms, was_suspended);
                info!(poll_ms = config.poll_ms, "Scheduler restarted with new period");
            }
        }
        config
    }

    pub fn get_pnl(&self, range: PnlRange, book: BookFilter) -> PnlReport {
        self.engine.ledger().pnl(range, book, self.engine.now_ms())
    }

    pub async fn place_entry(&self, request: ManualEntry) -> EngineResult<HistoryEvent> {
        self.engine.place_entry(request).await
    }
}
