//! Per-market hedge state machine for short-dated up/down markets.
//!
//! Enters the cheap side of a binary market, hedges the opposite side once
//! the combined cost leaves the profit target, and optionally cuts losers
//! with a two-step stop-loss ladder or a forced hedge near expiry.
//!
//! # Key Components
//!
//! - [`HedgeConfig`]: Strategy configuration, clamped by [`HedgeConfig::normalized`]
//! - [`evaluate_entry`] / [`evaluate_position`]: Pure per-tick decisions
//! - [`check_buy`]: Spread and depth quality gates
//! - [`profit_target_cents`]: Time-decayed profit target
//! - [`HedgeEngine`]: Tick loop body, order execution and settlement
//! - [`Scheduler`]: Interval driver with suspend/resume
//! - [`HedgeService`]: Lifecycle, status, history and manual entry

pub mod config;
pub mod decay;
pub mod decision;
pub mod engine;
pub mod error;
pub mod gates;
pub mod position;
pub mod scheduler;
pub mod service;

pub use config::{
    ConfigPatch, DecayMode, HedgeConfig, PanicHedgeConfig, ProfitDecayConfig, RiskMode,
    RiskTolerances, SimConfig, StopLossConfig,
};
pub use decay::{decayed_cents, profit_target_cents};
pub use decision::{
    evaluate_entry, evaluate_position, Blocked, Decision, Evaluation, OrderPlan, Quote,
    Settlement,
};
pub use engine::{HedgeEngine, ManualEntry, MarketStatus, SimStatus, TickSummary};
pub use error::{EngineError, EngineResult};
pub use gates::{check_buy, GateBlock, GateResult, GATE_DEPTH, GATE_SPREAD};
pub use position::{ActivePosition, MarketEntry, Phase, StopStage, DUST_SHARES};
pub use scheduler::{Scheduler, SchedulerState};
pub use service::{EngineStatus, HedgeService};
