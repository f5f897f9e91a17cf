//! Hedge engine.
//!
//! One [`HedgeEngine::tick`] reads the scoped cache, advances every tracked
//! market through `watching -> entered -> hedged | stopped | expired`, and
//! executes the resulting orders under the per-`(market, leg)` lock.
//!
//! Mutable state lives behind a `parking_lot::Mutex` that is never held
//! across an await. Decisions are taken under it, orders run after it is
//! released, and each plan is re-validated once its execution key is held.

use crate::config::{ConfigPatch, HedgeConfig};
use crate::decision::{
    evaluate_entry, evaluate_position, Blocked, Decision, Evaluation, OrderPlan, Quote,
    Settlement,
};
use crate::error::{EngineError, EngineResult};
use crate::position::{ActivePosition, MarketEntry, Phase, StopStage};
use hedge_core::{
    BookSet, ConditionId, DynClock, Leg, MarketSnapshot, OrderSide, Price, Timeframe, TokenId,
};
use hedge_executor::{
    DynTradingClient, ExecutionLock, ExecutionOutcome, Fill, HeldLock, LateAck, LockKey,
    LockedExecutor, SharedSimLedger, SimLedger, SimulatedTradingClient,
};
use hedge_feed::{CacheStatus, DataCache, Scope};
use hedge_ledger::{HistoryAction, HistoryEvent, HistoryStatus, Ledger};
use hedge_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Expired markets without a position are forgotten after this long.
const RETAIN_AFTER_EXPIRY_MS: u64 = 10 * 60 * 1000;

/// Manual entry request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntry {
    pub condition_id: ConditionId,
    /// 0 or 1.
    pub outcome_index: usize,
    /// Defaults to the configured entry size.
    #[serde(default)]
    pub amount_usd: Option<Decimal>,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub at_ms: u64,
    pub duration_ms: u64,
    pub markets: usize,
    pub positions: usize,
    pub orders: usize,
    pub skipped: usize,
    pub settled: usize,
    pub stale: bool,
    pub errors: Vec<String>,
}

impl TickSummary {
    fn count(&mut self, event: &HistoryEvent) {
        if event.status.is_order() {
            self.orders += 1;
        } else {
            self.skipped += 1;
        }
    }
}

/// Tracked market, as reported by status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketStatus {
    pub condition_id: ConditionId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub phase: Phase,
    pub seconds_to_expire: i64,
}

/// Simulated book balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimStatus {
    pub enabled: bool,
    pub initial_usdc: Decimal,
    pub cash_usdc: Decimal,
    pub equity_usdc: Decimal,
    pub pnl_usdc: Decimal,
}

#[derive(Debug, Default)]
struct EngineState {
    markets: HashMap<ConditionId, MarketEntry>,
    positions: HashMap<ConditionId, ActivePosition>,
    /// Last reported gate block per `(market, leg)`, so a persisting block
    /// is recorded once.
    gate_skips: HashMap<(ConditionId, Leg), &'static str>,
    /// Latest best bid per token, for equity.
    marks: HashMap<TokenId, Price>,
    last_tick: Option<TickSummary>,
}

/// What an order acts on.
enum Target<'a> {
    Entry(&'a MarketSnapshot),
    Position {
        condition_id: &'a ConditionId,
        symbol: &'a str,
    },
}

impl Target<'_> {
    fn condition_id(&self) -> &ConditionId {
        match self {
            Self::Entry(market) => &market.condition_id,
            Self::Position { condition_id, .. } => condition_id,
        }
    }

    fn symbol(&self) -> &str {
        match self {
            Self::Entry(market) => &market.symbol,
            Self::Position { symbol, .. } => symbol,
        }
    }
}

/// Cash and realized PnL produced by one fill.
struct Applied {
    cash_delta: Decimal,
    realized: Option<Decimal>,
}

pub struct HedgeEngine {
    config: RwLock<HedgeConfig>,
    data: Arc<DataCache>,
    executor: LockedExecutor,
    live_client: DynTradingClient,
    sim_client: DynTradingClient,
    sim_ledger: SharedSimLedger,
    ledger: Arc<Ledger>,
    clock: DynClock,
    state: Mutex<EngineState>,
}

impl HedgeEngine {
    #[must_use]
    pub fn new(
        config: HedgeConfig,
        data: Arc<DataCache>,
        live_client: DynTradingClient,
        ledger: Arc<Ledger>,
        clock: DynClock,
        order_timeout: Duration,
    ) -> Self {
        let config = config.normalized();
        data.set_symbols(config.symbols.clone());
        let sim_ledger: SharedSimLedger =
            Arc::new(Mutex::new(SimLedger::new(config.sim.initial_usdc)));
        let sim_client: DynTradingClient =
            Arc::new(SimulatedTradingClient::new(Arc::clone(&sim_ledger)));

        Self {
            config: RwLock::new(config),
            data,
            executor: LockedExecutor::new(ExecutionLock::new(Arc::clone(&clock)), order_timeout),
            live_client,
            sim_client,
            sim_ledger,
            ledger,
            clock,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn config(&self) -> HedgeConfig {
        self.config.read().clone()
    }

    /// Apply a partial update; returns the normalized result.
    pub fn update_config(&self, patch: ConfigPatch) -> HedgeConfig {
        let (previous, next) = {
            let mut guard = self.config.write();
            let previous = guard.clone();
            *guard = previous.clone().patched(patch);
            (previous, guard.clone())
        };

        if previous.symbols != next.symbols {
            self.data.set_symbols(next.symbols.clone());
        }
        if previous.sim.initial_usdc != next.sim.initial_usdc {
            self.reset_sim_if_idle(next.sim.initial_usdc);
        }
        info!(
            mode = ?next.mode,
            amount_usd = %next.amount_usd,
            poll_ms = next.poll_ms,
            sim = next.sim.enabled,
            "Config updated"
        );
        next
    }

    /// Reset the sim book unless it holds shares. Shares bought by an order
    /// whose fill is not yet applied count too, so the check and the reset
    /// run under both locks (state first, then the sim book).
    fn reset_sim_if_idle(&self, initial_usdc: Decimal) -> bool {
        let state = self.state.lock();
        let mut sim = self.sim_ledger.lock();
        let open = state.positions.values().any(|p| p.simulated)
            || !sim.positions_by_token_id.is_empty();
        if open {
            warn!(%initial_usdc, "Simulated positions open, sim balance not reset");
            return false;
        }
        sim.reset(initial_usdc);
        info!(%initial_usdc, "Sim ledger reset");
        true
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn sim_ledger(&self) -> SharedSimLedger {
        Arc::clone(&self.sim_ledger)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one evaluation pass over every configured timeframe.
    pub async fn tick(&self) -> TickSummary {
        let started = Instant::now();
        let config = self.config();

        let mut markets: Vec<MarketSnapshot> = Vec::new();
        let mut books = BookSet::new();
        let mut summary = TickSummary::default();
        for timeframe in &config.timeframes {
            let snapshot = self.data.snapshot(&Scope::Timeframe(*timeframe)).await;
            summary.stale |= snapshot.markets_stale || snapshot.books_stale;
            summary.errors.extend(snapshot.errors.iter().cloned());
            for market in snapshot.markets.iter() {
                let wanted = config
                    .symbols
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(&market.symbol));
                if wanted && !markets.iter().any(|m| m.condition_id == market.condition_id) {
                    markets.push(market.clone());
                }
            }
            for book in snapshot.books.iter() {
                books.insert(book.clone());
            }
        }

        let now_ms = self.clock.now_ms();
        summary.at_ms = now_ms;
        summary.markets = markets.len();

        let (position_evals, entry_evals) = self.evaluate(&config, &markets, &books, now_ms);

        for (condition_id, symbol, simulated, eval) in position_evals {
            self.apply_position(&condition_id, &symbol, simulated, eval, now_ms, &mut summary)
                .await;
        }

        let entry_simulated = config.sim.enabled;
        for (market, eval) in entry_evals {
            if self.note_block(
                &market.condition_id,
                &market.symbol,
                Leg::Entry,
                eval.blocked.as_ref(),
                entry_simulated,
                now_ms,
            ) {
                summary.skipped += 1;
            }
            if let Decision::Execute(plan) = eval.decision {
                let event = self
                    .execute_plan(Target::Entry(&market), plan, entry_simulated)
                    .await;
                summary.count(&event);
            }
        }

        self.prune(&books, now_ms);

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        summary.positions = self.state.lock().positions.len();
        Metrics::tick_duration(started.elapsed().as_secs_f64() * 1000.0);
        Metrics::open_positions(summary.positions);
        if let Some(equity) = self.sim_status().equity_usdc.to_f64() {
            Metrics::sim_equity(equity);
        }

        if !summary.errors.is_empty() {
            warn!(errors = ?summary.errors, stale = summary.stale, "Tick ran on degraded data");
        }
        debug!(
            markets = summary.markets,
            positions = summary.positions,
            orders = summary.orders,
            skipped = summary.skipped,
            settled = summary.settled,
            duration_ms = summary.duration_ms,
            "Tick complete"
        );

        self.state.lock().last_tick = Some(summary.clone());
        summary
    }

    /// Register markets, refresh marks, and take every decision on the
    /// current state.
    #[allow(clippy::type_complexity)]
    fn evaluate(
        &self,
        config: &HedgeConfig,
        markets: &[MarketSnapshot],
        books: &BookSet,
        now_ms: u64,
    ) -> (
        Vec<(ConditionId, String, bool, Evaluation)>,
        Vec<(MarketSnapshot, Evaluation)>,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for market in markets {
            state
                .markets
                .entry(market.condition_id.clone())
                .or_insert_with(|| MarketEntry::watching(market));
        }
        for book in books.iter() {
            if let Some(bid) = book.best_bid() {
                state.marks.insert(book.token_id.clone(), bid);
            }
        }

        let mut position_evals = Vec::with_capacity(state.positions.len());
        for position in state.positions.values_mut() {
            if let Some(bid) = books.get(&position.entry_token_id).and_then(|b| b.best_bid()) {
                position.last_entry_bid = Some(bid);
                position.entry_bid.get_or_insert(bid);
            }
            if let Some(bid) = books.get(&position.hedge_token_id).and_then(|b| b.best_bid()) {
                position.last_hedge_bid = Some(bid);
            }
            position_evals.push((
                position.condition_id.clone(),
                position.symbol.clone(),
                position.simulated,
                evaluate_position(config, position, books, now_ms),
            ));
        }

        let entry_evals = markets
            .iter()
            .filter(|m| {
                !state.positions.contains_key(&m.condition_id)
                    && state
                        .markets
                        .get(&m.condition_id)
                        .is_some_and(|e| e.phase == Phase::Watching)
            })
            .map(|m| (m.clone(), evaluate_entry(config, m, books, now_ms)))
            .collect();

        (position_evals, entry_evals)
    }

    async fn apply_position(
        &self,
        condition_id: &ConditionId,
        symbol: &str,
        simulated: bool,
        eval: Evaluation,
        now_ms: u64,
        summary: &mut TickSummary,
    ) {
        if self.note_block(
            condition_id,
            symbol,
            Leg::Hedge,
            eval.blocked.as_ref(),
            simulated,
            now_ms,
        ) {
            summary.skipped += 1;
        }
        match eval.decision {
            Decision::Hold => {}
            Decision::Execute(plan) => {
                let target = Target::Position {
                    condition_id,
                    symbol,
                };
                let event = self.execute_plan(target, plan, simulated).await;
                summary.count(&event);
            }
            Decision::Settle(settlement) => {
                if self.settle(condition_id, settlement, now_ms).is_some() {
                    summary.settled += 1;
                }
            }
        }
    }

    /// Record a gate block once per change of kind. Returns true if a skip
    /// event was written.
    fn note_block(
        &self,
        condition_id: &ConditionId,
        symbol: &str,
        leg: Leg,
        blocked: Option<&Blocked>,
        simulated: bool,
        now_ms: u64,
    ) -> bool {
        let key = (condition_id.clone(), leg);
        let Some(blocked) = blocked else {
            self.state.lock().gate_skips.remove(&key);
            return false;
        };
        {
            let mut state = self.state.lock();
            if state.gate_skips.get(&key) == Some(&blocked.block.kind) {
                return false;
            }
            state.gate_skips.insert(key, blocked.block.kind);
        }

        Metrics::skip(leg.as_str(), blocked.block.kind);
        debug!(
            %condition_id,
            action = %blocked.action,
            outcome = %blocked.outcome_name,
            gate = blocked.block.kind,
            detail = %blocked.block.detail,
            "Gate blocked"
        );
        self.record(
            HistoryEvent::new(
                now_ms,
                blocked.action,
                HistoryStatus::Skipped,
                symbol,
                condition_id.clone(),
                simulated,
            )
            .with_outcome(blocked.outcome_name.clone())
            .with_reason(blocked.block.to_string())
            .with_quote(blocked.quote.best_bid, blocked.quote.best_ask),
        );
        true
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    async fn execute_plan(
        &self,
        target: Target<'_>,
        plan: OrderPlan,
        simulated: bool,
    ) -> HistoryEvent {
        let condition_id = target.condition_id().clone();
        let symbol = target.symbol().to_string();
        let leg = plan.leg();
        let now_ms = self.clock.now_ms();
        let event = |status: HistoryStatus| {
            HistoryEvent::new(
                now_ms,
                plan.action,
                status,
                symbol.clone(),
                condition_id.clone(),
                simulated,
            )
            .with_outcome(plan.outcome_name.clone())
            .with_reason(plan.reason.clone())
            .with_quote(plan.quote.best_bid, plan.quote.best_ask)
            .with_order(plan.price, plan.amount_usd())
        };

        let ticket = match self
            .executor
            .try_acquire(LockKey::new(condition_id.clone(), leg))
        {
            Ok(ticket) => ticket,
            Err(busy) => {
                debug!(key = %busy.key, held_since_ms = busy.held_since_ms, "Order in flight, skipping");
                Metrics::skip(leg.as_str(), "in-flight");
                return self.record(event(HistoryStatus::Skipped).with_reason("in-flight"));
            }
        };

        if let Err(reason) = self.revalidate(&target, &plan) {
            debug!(%condition_id, action = %plan.action, reason, "State changed before submit");
            Metrics::skip(leg.as_str(), reason);
            return self.record(event(HistoryStatus::Skipped).with_reason(reason));
        }

        let client = if simulated {
            Arc::clone(&self.sim_client)
        } else {
            Arc::clone(&self.live_client)
        };
        info!(
            %condition_id,
            action = %plan.action,
            outcome = %plan.outcome_name,
            side = %plan.side,
            price = %plan.price,
            amount = %plan.amount,
            simulated,
            reason = %plan.reason,
            "Submitting order"
        );
        let submission = self
            .executor
            .submit_tracked(ticket, client, plan.order_args(&condition_id))
            .await;
        let outcome = submission.outcome;
        Metrics::order(leg.as_str(), outcome.label(), simulated);
        if let Some(late) = submission.late {
            self.watch_late_ack(event(HistoryStatus::Filled).with_reason("late-ack"), late);
        }

        let recorded = match outcome {
            ExecutionOutcome::Filled(fill) => {
                let applied = self.apply_fill(&target, &plan, &fill, simulated);
                let recorded = event(HistoryStatus::Filled)
                    .with_order(fill.price, fill.notional())
                    .with_fill(fill.shares, fill.ack.order_id.clone())
                    .with_cash_delta(applied.cash_delta);
                match applied.realized {
                    Some(pnl) => recorded.with_realized_pnl(pnl),
                    None => recorded,
                }
            }
            ExecutionOutcome::Failed { error } => event(HistoryStatus::Failed).with_error(error),
            ExecutionOutcome::TimedOut { after_ms } => event(HistoryStatus::TimedOut)
                .with_error(format!("no acknowledgement within {after_ms}ms")),
            ExecutionOutcome::Busy => event(HistoryStatus::Skipped).with_reason("in-flight"),
        };
        self.record(recorded)
    }

    /// Record the result of an order that answered after its timeout. The
    /// position is left as the timeout left it; the event is for audit.
    fn watch_late_ack(&self, template: HistoryEvent, late: oneshot::Receiver<LateAck>) {
        let ledger = Arc::clone(&self.ledger);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let Ok(ack) = late.await else {
                return;
            };
            let event = template.follow_up(clock.now_ms());
            let event = match ack {
                LateAck::Filled(fill) => event.with_fill(fill.shares, fill.ack.order_id),
                LateAck::Failed { error } => {
                    event.with_status(HistoryStatus::Failed).with_error(error)
                }
            };
            ledger.append(event);
        });
    }

    /// Check the plan still applies now that the key is held.
    fn revalidate(&self, target: &Target<'_>, plan: &OrderPlan) -> Result<(), &'static str> {
        let state = self.state.lock();
        match target {
            Target::Entry(market) => {
                if state.positions.contains_key(&market.condition_id) {
                    return Err("already-entered");
                }
                match state.markets.get(&market.condition_id) {
                    Some(entry) if entry.phase != Phase::Watching => Err("phase-changed"),
                    _ => Ok(()),
                }
            }
            Target::Position { condition_id, .. } => {
                let Some(position) = state.positions.get(*condition_id) else {
                    return Err("no-position");
                };
                if position.phase != Phase::Entered {
                    return Err("phase-changed");
                }
                match plan.side {
                    OrderSide::Buy if position.hedge_needed().is_zero() => Err("already-hedged"),
                    OrderSide::Sell if position.stop_stage >= plan.stop_stage => {
                        Err("stage-done")
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    fn apply_fill(
        &self,
        target: &Target<'_>,
        plan: &OrderPlan,
        fill: &Fill,
        simulated: bool,
    ) -> Applied {
        let notional = fill.notional();
        let now_ms = self.clock.now_ms();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match target {
            Target::Entry(market) => {
                let position = ActivePosition::open(
                    market,
                    plan.outcome_index,
                    fill.price,
                    fill.shares,
                    notional,
                    simulated,
                    now_ms,
                )
                .with_entry_bid(plan.quote.best_bid);
                state
                    .markets
                    .entry(market.condition_id.clone())
                    .or_insert_with(|| MarketEntry::watching(market))
                    .phase = Phase::Entered;
                state.positions.insert(market.condition_id.clone(), position);
                Applied {
                    cash_delta: -notional,
                    realized: None,
                }
            }
            Target::Position { condition_id, .. } => {
                let Some(position) = state.positions.get_mut(*condition_id) else {
                    warn!(%condition_id, "Fill for a position no longer tracked");
                    return Applied {
                        cash_delta: Decimal::ZERO,
                        realized: None,
                    };
                };
                let applied = match plan.side {
                    OrderSide::Buy => {
                        position.record_hedge(fill.shares, fill.price, notional);
                        Applied {
                            cash_delta: -notional,
                            realized: None,
                        }
                    }
                    OrderSide::Sell => {
                        let pnl = position.record_sale(fill.shares, notional, plan.stop_stage);
                        Applied {
                            cash_delta: notional,
                            realized: Some(pnl),
                        }
                    }
                };
                let phase = position.phase;
                if phase == Phase::Stopped {
                    state.positions.remove(*condition_id);
                }
                if let Some(entry) = state.markets.get_mut(*condition_id) {
                    entry.phase = phase;
                }
                if phase != Phase::Entered {
                    info!(%condition_id, %phase, "Position advanced");
                }
                applied
            }
        }
    }

    /// Close a position at expiry.
    fn settle(
        &self,
        condition_id: &ConditionId,
        settlement: Settlement,
        now_ms: u64,
    ) -> Option<HistoryEvent> {
        let position = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let position = state.positions.remove(condition_id)?;
            if let Some(entry) = state.markets.get_mut(condition_id) {
                if entry.phase == Phase::Entered {
                    entry.phase = Phase::Expired;
                }
            }
            state.gate_skips.retain(|(cid, _), _| cid != condition_id);
            position
        };

        let payout = position.entry_held().inner() * settlement.entry_payout
            + position.hedge_filled_shares.inner() * settlement.hedge_payout;
        let realized = payout - position.open_cost_usd();
        if position.simulated {
            let mut sim = self.sim_ledger.lock();
            sim.settle(&position.entry_token_id, settlement.entry_payout);
            sim.settle(&position.hedge_token_id, settlement.hedge_payout);
        }

        let winner = if settlement.entry_payout == Decimal::ONE {
            position.entry_outcome_name.as_str()
        } else if settlement.hedge_payout == Decimal::ONE {
            position.hedge_outcome_name.as_str()
        } else {
            "unknown"
        };
        info!(
            %condition_id,
            symbol = %position.symbol,
            winner,
            payout = %payout,
            realized_pnl = %realized,
            simulated = position.simulated,
            "Position settled"
        );

        Some(self.record(
            HistoryEvent::new(
                now_ms,
                HistoryAction::Settle,
                HistoryStatus::Settled,
                position.symbol.clone(),
                condition_id.clone(),
                position.simulated,
            )
            .with_outcome(position.entry_outcome_name.clone())
            .with_reason(format!("resolved {winner}"))
            .with_quote(settlement.entry_bid, None)
            .with_cash_delta(payout)
            .with_realized_pnl(realized),
        ))
    }

    fn prune(&self, books: &BookSet, now_ms: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for entry in state.markets.values_mut() {
            if entry.phase == Phase::Watching && entry.end_time_ms <= now_ms {
                entry.phase = Phase::Expired;
            }
        }
        let positions = &state.positions;
        state.markets.retain(|cid, entry| {
            positions.contains_key(cid) || entry.end_time_ms + RETAIN_AFTER_EXPIRY_MS > now_ms
        });
        let markets = &state.markets;
        state.gate_skips.retain(|(cid, _), _| markets.contains_key(cid));
        state.marks.retain(|token, _| {
            books.get(token).is_some()
                || positions
                    .values()
                    .any(|p| &p.entry_token_id == token || &p.hedge_token_id == token)
        });
    }

    fn record(&self, event: HistoryEvent) -> HistoryEvent {
        self.ledger.append(event.clone());
        event
    }

    // ------------------------------------------------------------------
    // Manual entry
    // ------------------------------------------------------------------

    /// Enter a market outside the automatic window and band. Goes through
    /// the same `(market, entry)` lock as automatic entries.
    pub async fn place_entry(&self, request: ManualEntry) -> EngineResult<HistoryEvent> {
        if request.outcome_index > 1 {
            return Err(EngineError::InvalidOutcome(request.outcome_index));
        }
        let config = self.config();

        let info = self.data.market_info(&request.condition_id).await?;
        let market = info.into_snapshot(self.clock.now_ms())?;
        if market.seconds_to_expire <= 0 {
            return Err(EngineError::MarketExpired(market.condition_id.to_string()));
        }

        let token = &market.outcome_tokens[request.outcome_index];
        let books = self
            .data
            .books_for(std::slice::from_ref(&token.token_id))
            .await?;
        let quote = Quote::of(books.get(&token.token_id));
        let ask = quote
            .best_ask
            .ok_or_else(|| EngineError::NoLiquidity(token.token_id.to_string()))?;
        let amount = request
            .amount_usd
            .filter(|a| *a > Decimal::ZERO)
            .unwrap_or(config.amount_usd);

        self.state
            .lock()
            .markets
            .entry(market.condition_id.clone())
            .or_insert_with(|| MarketEntry::watching(&market));

        let plan = OrderPlan {
            action: HistoryAction::Entry,
            outcome_index: request.outcome_index,
            outcome_name: token.outcome.clone(),
            token_id: token.token_id.clone(),
            side: OrderSide::Buy,
            price: ask,
            amount,
            quote,
            stop_stage: StopStage::None,
            reason: format!("manual entry at {}c", ask.cents().normalize()),
        };
        Ok(self
            .execute_plan(Target::Entry(&market), plan, config.sim.enabled)
            .await)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn markets(&self) -> Vec<MarketStatus> {
        let now_ms = self.clock.now_ms();
        let state = self.state.lock();
        let mut markets: Vec<MarketStatus> = state
            .markets
            .values()
            .map(|e| MarketStatus {
                condition_id: e.condition_id.clone(),
                symbol: e.symbol.clone(),
                timeframe: e.timeframe,
                phase: e.phase,
                seconds_to_expire: (e.end_time_ms as i64 - now_ms as i64).div_euclid(1000),
            })
            .collect();
        markets.sort_by(|a, b| {
            a.seconds_to_expire
                .cmp(&b.seconds_to_expire)
                .then_with(|| a.condition_id.cmp(&b.condition_id))
        });
        markets
    }

    pub fn positions(&self) -> Vec<ActivePosition> {
        let mut positions: Vec<ActivePosition> =
            self.state.lock().positions.values().cloned().collect();
        positions.sort_by_key(|p| (p.opened_at_ms, p.condition_id.clone()));
        positions
    }

    pub fn position(&self, condition_id: &ConditionId) -> Option<ActivePosition> {
        self.state.lock().positions.get(condition_id).cloned()
    }

    pub fn phase(&self, condition_id: &ConditionId) -> Option<Phase> {
        self.state.lock().markets.get(condition_id).map(|e| e.phase)
    }

    pub fn sim_status(&self) -> SimStatus {
        let enabled = self.config.read().sim.enabled;
        let marks = self.state.lock().marks.clone();
        let sim = self.sim_ledger.lock();
        let equity_usdc = sim.equity(|token| marks.get(token).copied());
        SimStatus {
            enabled,
            initial_usdc: sim.initial_usdc,
            cash_usdc: sim.cash_usdc,
            equity_usdc,
            pnl_usdc: equity_usdc - sim.initial_usdc,
        }
    }

    pub fn held_locks(&self) -> Vec<HeldLock> {
        self.executor.lock().held_keys()
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.data.status()
    }

    pub fn last_tick(&self) -> Option<TickSummary> {
        self.state.lock().last_tick.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedge_core::{BookLevel, BookSnapshot, ManualClock, OutcomeToken, Size};
    use hedge_executor::MockTradingClient;
    use hedge_feed::{CacheConfig, MockMarketProvider, MockOrderbookProvider};
    use hedge_ledger::{HistoryFilter, HistoryView};
    use rust_decimal_macros::dec;

    const START: u64 = 1_700_000_000_000;

    struct Harness {
        engine: HedgeEngine,
        clock: Arc<ManualClock>,
        markets: Arc<MockMarketProvider>,
        books: Arc<MockOrderbookProvider>,
        client: Arc<MockTradingClient>,
    }

    fn market(secs_left: u64) -> MarketSnapshot {
        MarketSnapshot::new(
            ConditionId::from("0xabc"),
            "BTC",
            Timeframe::M15,
            [OutcomeToken::new("Up", "up"), OutcomeToken::new("Down", "down")],
            START + secs_left * 1000,
            START,
        )
    }

    fn book(token: &str, bid: Decimal, ask: Decimal) -> BookSnapshot {
        BookSnapshot::new(
            TokenId::from(token),
            vec![BookLevel::new(Price::new(bid), Size::new(dec!(1000)))],
            vec![BookLevel::new(Price::new(ask), Size::new(dec!(1000)))],
        )
    }

    fn harness(config: HedgeConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(START));
        let markets = Arc::new(MockMarketProvider::new());
        let books = Arc::new(MockOrderbookProvider::new());
        let client = Arc::new(MockTradingClient::new());
        let cache_config = CacheConfig {
            min_refresh_ms: 0,
            ..CacheConfig::default()
        };
        let data = Arc::new(DataCache::new(
            cache_config,
            config.symbols.clone(),
            markets.clone(),
            books.clone(),
            clock.clone(),
        ));
        let engine = HedgeEngine::new(
            config,
            data,
            client.clone(),
            Arc::new(Ledger::default()),
            clock.clone(),
            Duration::from_secs(5),
        );
        Harness {
            engine,
            clock,
            markets,
            books,
            client,
        }
    }

    fn history(engine: &HedgeEngine) -> Vec<HistoryEvent> {
        engine.ledger().get_history(&HistoryFilter::default())
    }

    #[tokio::test]
    async fn test_tick_enters_cheap_outcome() {
        let h = harness(HedgeConfig::default());
        h.markets.set_markets(vec![market(600)]);
        h.books.set_book(book("up", dec!(0.11), dec!(0.12)));
        h.books.set_book(book("down", dec!(0.87), dec!(0.89)));

        let summary = h.engine.tick().await;
        assert_eq!(summary.markets, 1);
        assert_eq!(summary.orders, 1);
        assert_eq!(h.client.calls(), 1);

        let cid = ConditionId::from("0xabc");
        assert_eq!(h.engine.phase(&cid), Some(Phase::Entered));
        let position = h.engine.position(&cid).unwrap();
        assert_eq!(position.entry_token_id, TokenId::from("up"));
        assert_eq!(position.entry_price, Price::new(dec!(0.12)));

        let events = history(&h.engine);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, HistoryAction::Entry);
        assert_eq!(events[0].status, HistoryStatus::Filled);
        assert!(!events[0].simulated);

        // Entered markets are not re-entered.
        h.engine.tick().await;
        assert_eq!(h.client.calls(), 1);
    }

    #[tokio::test]
    async fn test_gate_block_recorded_once() {
        let h = harness(HedgeConfig::default());
        h.markets.set_markets(vec![market(600)]);
        h.books.set_book(book("up", dec!(0.02), dec!(0.12)));
        h.books.set_book(book("down", dec!(0.87), dec!(0.89)));

        let first = h.engine.tick().await;
        let second = h.engine.tick().await;
        assert_eq!(first.skipped, 1);
        assert_eq!(second.skipped, 0);

        let skipped = h.engine.ledger().get_history(&HistoryFilter {
            view: HistoryView::Attempts,
            ..HistoryFilter::default()
        });
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].reason.as_deref().unwrap().starts_with("spread"));
        assert_eq!(h.client.calls(), 0);
    }

    #[tokio::test]
    async fn test_sim_mode_routes_to_sim_ledger() {
        let mut config = HedgeConfig::default();
        config.sim.enabled = true;
        let h = harness(config);
        h.markets.set_markets(vec![market(600)]);
        h.books.set_book(book("up", dec!(0.09), dec!(0.10)));
        h.books.set_book(book("down", dec!(0.88), dec!(0.90)));

        h.engine.tick().await;
        assert_eq!(h.client.calls(), 0);

        let sim = h.engine.sim_status();
        assert_eq!(sim.cash_usdc, dec!(990));
        // 100 shares marked at the 0.09 bid.
        assert_eq!(sim.equity_usdc, dec!(999));
        assert_eq!(sim.pnl_usdc, dec!(-1));
        assert!(history(&h.engine)[0].simulated);
    }

    #[tokio::test]
    async fn test_failed_order_keeps_watching() {
        let h = harness(HedgeConfig::default());
        h.client
            .set_failure(hedge_executor::ExecutorError::OrderRejected("no".into()));
        h.markets.set_markets(vec![market(600)]);
        h.books.set_book(book("up", dec!(0.11), dec!(0.12)));
        h.books.set_book(book("down", dec!(0.87), dec!(0.89)));

        h.engine.tick().await;
        let cid = ConditionId::from("0xabc");
        assert_eq!(h.engine.phase(&cid), Some(Phase::Watching));
        assert!(h.engine.position(&cid).is_none());
        let events = history(&h.engine);
        assert_eq!(events[0].status, HistoryStatus::Failed);
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn test_expired_watching_market_is_marked() {
        let h = harness(HedgeConfig::default());
        h.markets.set_markets(vec![market(600)]);
        h.engine.tick().await;

        h.clock.advance(601_000);
        h.engine.tick().await;
        assert_eq!(
            h.engine.phase(&ConditionId::from("0xabc")),
            Some(Phase::Expired)
        );

        h.clock.advance(RETAIN_AFTER_EXPIRY_MS);
        h.markets.set_markets(vec![]);
        h.engine.tick().await;
        assert!(h.engine.markets().is_empty());
    }

    #[test]
    fn test_sim_reset_only_when_idle() {
        let h = harness(HedgeConfig::default());
        h.engine.sim_ledger().lock().cash_usdc = dec!(500);

        let patch = ConfigPatch {
            sim: Some(crate::config::SimConfig {
                enabled: true,
                initial_usdc: dec!(2000),
            }),
            ..ConfigPatch::default()
        };
        let config = h.engine.update_config(patch);
        assert!(config.sim.enabled);
        assert_eq!(h.engine.sim_status().cash_usdc, dec!(2000));
    }

    fn sim_patch(initial_usdc: Decimal) -> ConfigPatch {
        ConfigPatch {
            sim: Some(crate::config::SimConfig {
                enabled: true,
                initial_usdc,
            }),
            ..ConfigPatch::default()
        }
    }

    #[tokio::test]
    async fn test_sim_reset_refused_with_open_position() {
        let mut config = HedgeConfig::default();
        config.sim.enabled = true;
        let h = harness(config);
        h.markets.set_markets(vec![market(600)]);
        h.books.set_book(book("up", dec!(0.09), dec!(0.10)));
        h.books.set_book(book("down", dec!(0.88), dec!(0.90)));
        h.engine.tick().await;
        assert!(h.engine.position(&ConditionId::from("0xabc")).is_some());

        let before = h.engine.sim_ledger().lock().clone();
        let config = h.engine.update_config(sim_patch(dec!(2000)));
        assert_eq!(config.sim.initial_usdc, dec!(2000));

        let after = h.engine.sim_ledger().lock().clone();
        assert_eq!(after, before);
        assert_eq!(after.cash_usdc, dec!(990));
        assert_eq!(after.position(&TokenId::from("up")).inner(), dec!(100));
        assert_eq!(h.engine.sim_status().initial_usdc, dec!(1000));
    }

    #[test]
    fn test_sim_reset_refused_with_unapplied_fill() {
        let h = harness(HedgeConfig::default());
        // Filled on the sim book, not yet recorded as a position.
        h.engine
            .sim_ledger()
            .lock()
            .buy(&TokenId::from("up"), dec!(10), Price::new(dec!(0.10)))
            .unwrap();

        assert!(!h.engine.reset_sim_if_idle(dec!(2000)));
        let sim = h.engine.sim_ledger().lock().clone();
        assert_eq!(sim.cash_usdc, dec!(990));
        assert_eq!(sim.position(&TokenId::from("up")).inner(), dec!(100));

        h.engine
            .sim_ledger()
            .lock()
            .sell(&TokenId::from("up"), Size::new(dec!(100)), Price::new(dec!(0.10)))
            .unwrap();
        assert!(h.engine.reset_sim_if_idle(dec!(2000)));
        assert_eq!(h.engine.sim_status().cash_usdc, dec!(2000));
    }
}
