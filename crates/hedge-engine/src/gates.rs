//! Book quality gates.
//!
//! Spread first, then depth under the price ceiling. A blocked gate carries
//! a stable `kind` (used to de-duplicate history) and a human-readable
//! detail.

use crate::config::RiskTolerances;
use hedge_core::{compute_ask_depth, AskDepth, BookSnapshot, Price};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

pub const GATE_SPREAD: &str = "spread";
pub const GATE_DEPTH: &str = "depth";

/// Why a gate blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateBlock {
    pub kind: &'static str,
    pub detail: String,
}

impl fmt::Display for GateBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Result of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    /// Gates passed; depth under the ceiling.
    Pass(AskDepth),
    Block(GateBlock),
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }
}

/// Check spread and depth for buying up to `target_usd` at or below `ceiling`.
///
/// Depth must reach `target_usd * min_depth_pct / 100`.
pub fn check_buy(
    book: &BookSnapshot,
    ceiling: Price,
    target_usd: Decimal,
    tolerances: &RiskTolerances,
    max_levels: usize,
) -> GateResult {
    match book.spread_cents() {
        None => {
            return GateResult::Block(GateBlock {
                kind: GATE_SPREAD,
                detail: "no two-sided quote".to_string(),
            })
        }
        Some(spread) if spread > tolerances.max_spread_cents => {
            return GateResult::Block(GateBlock {
                kind: GATE_SPREAD,
                detail: format!("{spread}c > {}c", tolerances.max_spread_cents),
            })
        }
        Some(_) => {}
    }

    let depth = compute_ask_depth(&book.asks, ceiling, Some(target_usd), max_levels);
    let required = target_usd * tolerances.min_depth_pct / Decimal::ONE_HUNDRED;
    if depth.depth_usd < required || depth.depth_usd.is_zero() {
        return GateResult::Block(GateBlock {
            kind: GATE_DEPTH,
            detail: format!("${} < ${} under {}", depth.depth_usd, required, ceiling),
        });
    }

    GateResult::Pass(depth)
}
