//! Per-market phase and position model.

use hedge_core::{ConditionId, MarketSnapshot, Price, Size, Timeframe, TokenId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;

/// Share balances below this are treated as flat.
pub const DUST_SHARES: Decimal = dec!(0.01);

/// Market phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Watching,
    Entered,
    Hedged,
    Stopped,
    Expired,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Watching => "watching",
            Self::Entered => "entered",
            Self::Hedged => "hedged",
            Self::Stopped => "stopped",
            Self::Expired => "expired",
        }
    }

    /// No further orders are placed from this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Hedged | Self::Stopped | Self::Expired)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stop-loss ladder progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStage {
    #[default]
    None,
    Cut1,
    Cut2,
}

/// Tracked market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketEntry {
    pub condition_id: ConditionId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub end_time_ms: u64,
    pub phase: Phase,
}

impl MarketEntry {
    pub fn watching(market: &MarketSnapshot) -> Self {
        Self {
            condition_id: market.condition_id.clone(),
            symbol: market.symbol.clone(),
            timeframe: market.timeframe,
            end_time_ms: market.end_time_ms,
            phase: Phase::Watching,
        }
    }
}

/// Open position on one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePosition {
    pub condition_id: ConditionId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub phase: Phase,
    /// Index (0/1) of the entry outcome.
    pub entry_outcome: usize,
    pub entry_outcome_name: String,
    pub hedge_outcome_name: String,
    pub entry_token_id: TokenId,
    pub hedge_token_id: TokenId,
    pub entry_price: Price,
    pub entry_filled_shares: Size,
    pub entry_cost_usd: Decimal,
    pub hedge_price: Option<Price>,
    pub hedge_filled_shares: Size,
    pub hedge_cost_usd: Decimal,
    pub sold_shares: Size,
    pub sell_proceeds_usd: Decimal,
    pub stop_stage: StopStage,
    pub end_time_ms: u64,
    pub simulated: bool,
    /// Best bid on the entry token when the entry filled. Stop-loss drops
    /// are measured from it, so the entry spread never counts as a drop.
    pub entry_bid: Option<Price>,
    pub last_entry_bid: Option<Price>,
    pub last_hedge_bid: Option<Price>,
    pub opened_at_ms: u64,
}

impl ActivePosition {
    /// Position from a filled entry on `market`'s outcome `entry_outcome`.
    pub fn open(
        market: &MarketSnapshot,
        entry_outcome: usize,
        price: Price,
        shares: Size,
        cost_usd: Decimal,
        simulated: bool,
        now_ms: u64,
    ) -> Self {
        let hedge_outcome = MarketSnapshot::opposite(entry_outcome);
        let entry = &market.outcome_tokens[entry_outcome & 1];
        let hedge = &market.outcome_tokens[hedge_outcome];
        Self {
            condition_id: market.condition_id.clone(),
            symbol: market.symbol.clone(),
            timeframe: market.timeframe,
            phase: Phase::Entered,
            entry_outcome: entry_outcome & 1,
            entry_outcome_name: entry.outcome.clone(),
            hedge_outcome_name: hedge.outcome.clone(),
            entry_token_id: entry.token_id.clone(),
            hedge_token_id: hedge.token_id.clone(),
            entry_price: price,
            entry_filled_shares: shares,
            entry_cost_usd: cost_usd,
            hedge_price: None,
            hedge_filled_shares: Size::ZERO,
            hedge_cost_usd: Decimal::ZERO,
            sold_shares: Size::ZERO,
            sell_proceeds_usd: Decimal::ZERO,
            stop_stage: StopStage::None,
            end_time_ms: market.end_time_ms,
            simulated,
            entry_bid: None,
            last_entry_bid: None,
            last_hedge_bid: None,
            opened_at_ms: now_ms,
        }
    }

    /// Set the stop-loss reference bid.
    pub fn with_entry_bid(mut self, bid: Option<Price>) -> Self {
        self.entry_bid = bid;
        self.last_entry_bid = bid;
        self
    }

    pub fn seconds_to_expire_at(&self, now_ms: u64) -> i64 {
        (self.end_time_ms as i64 - now_ms as i64).div_euclid(1000)
    }

    /// Entry shares not yet sold.
    pub fn entry_held(&self) -> Size {
        let held = self.entry_filled_shares - self.sold_shares;
        if held.is_positive() {
            held
        } else {
            Size::ZERO
        }
    }

    /// Hedge shares still needed to cover the held entry.
    pub fn hedge_needed(&self) -> Size {
        let needed = self.entry_held() - self.hedge_filled_shares;
        if needed.inner() > DUST_SHARES {
            needed
        } else {
            Size::ZERO
        }
    }

    pub fn is_flat(&self) -> bool {
        self.entry_held().inner() <= DUST_SHARES && self.hedge_filled_shares.inner() <= DUST_SHARES
    }

    /// Cost basis of the shares still held.
    pub fn open_cost_usd(&self) -> Decimal {
        self.entry_held().notional(self.entry_price) + self.hedge_cost_usd
    }

    pub fn record_hedge(&mut self, shares: Size, price: Price, cost_usd: Decimal) {
        self.hedge_filled_shares = self.hedge_filled_shares + shares;
        self.hedge_cost_usd += cost_usd;
        self.hedge_price = Some(price);
        if self.hedge_needed().is_zero() {
            self.phase = Phase::Hedged;
        }
    }

    /// Record a stop-loss sale; returns the realized PnL of the sold shares.
    pub fn record_sale(&mut self, shares: Size, proceeds_usd: Decimal, stage: StopStage) -> Decimal {
        let shares = shares.min(self.entry_held());
        self.sold_shares = self.sold_shares + shares;
        self.sell_proceeds_usd += proceeds_usd;
        self.stop_stage = self.stop_stage.max(stage);
        if self.is_flat() {
            self.phase = Phase::Stopped;
        }
        proceeds_usd - shares.notional(self.entry_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedge_core::OutcomeToken;

    fn market() -> MarketSnapshot {
        MarketSnapshot::new(
            ConditionId::from("0xabc"),
            "BTC",
            Timeframe::M15,
            [OutcomeToken::new("Up", "up"), OutcomeToken::new("Down", "down")],
            900_000,
            0,
        )
    }

    fn position() -> ActivePosition {
        ActivePosition::open(
            &market(),
            1,
            Price::new(dec!(0.10)),
            Size::new(dec!(100)),
            dec!(10),
            false,
            0,
        )
    }

    #[test]
    fn test_open_picks_tokens() {
        let pos = position();
        assert_eq!(pos.entry_token_id, TokenId::from("down"));
        assert_eq!(pos.hedge_token_id, TokenId::from("up"));
        assert_eq!(pos.hedge_outcome_name, "Up");
        assert_eq!(pos.seconds_to_expire_at(300_000), 600);
    }

    #[test]
    fn test_hedge_completes_in_parts() {
        let mut pos = position();
        pos.record_hedge(Size::new(dec!(60)), Price::new(dec!(0.80)), dec!(48));
        assert_eq!(pos.phase, Phase::Entered);
        assert_eq!(pos.hedge_needed(), Size::new(dec!(40)));

        pos.record_hedge(Size::new(dec!(40)), Price::new(dec!(0.79)), dec!(31.6));
        assert_eq!(pos.phase, Phase::Hedged);
        assert_eq!(pos.open_cost_usd(), dec!(89.6));
    }

    #[test]
    fn test_sale_ladder_to_stopped() {
        let mut pos = position();
        let pnl = pos.record_sale(Size::new(dec!(50)), dec!(4.5), StopStage::Cut1);
        assert_eq!(pnl, dec!(-0.5));
        assert_eq!(pos.phase, Phase::Entered);
        assert_eq!(pos.stop_stage, StopStage::Cut1);

        let pnl = pos.record_sale(Size::new(dec!(50)), dec!(4), StopStage::Cut2);
        assert_eq!(pnl, dec!(-1));
        assert_eq!(pos.phase, Phase::Stopped);
        assert!(pos.is_flat());
    }
}
