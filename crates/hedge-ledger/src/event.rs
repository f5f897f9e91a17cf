//! History events.
//!
//! Every attempted or realized transition of a tracked market produces one
//! immutable `HistoryEvent`. Optional fields are omitted from JSON when unset.

use hedge_core::{ConditionId, Leg, Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Entry,
    Hedge,
    PanicHedge,
    #[serde(rename = "stop_loss_1")]
    StopLoss1,
    #[serde(rename = "stop_loss_2")]
    StopLoss2,
    Settle,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Hedge => "hedge",
            Self::PanicHedge => "panic_hedge",
            Self::StopLoss1 => "stop_loss_1",
            Self::StopLoss2 => "stop_loss_2",
            Self::Settle => "settle",
        }
    }

    /// Lock leg the action trades on. Settlement places no order.
    pub fn leg(&self) -> Option<Leg> {
        match self {
            Self::Entry => Some(Leg::Entry),
            Self::Hedge | Self::PanicHedge => Some(Leg::Hedge),
            Self::StopLoss1 | Self::StopLoss2 => Some(Leg::Exit),
            Self::Settle => None,
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Filled,
    Failed,
    Skipped,
    TimedOut,
    Settled,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filled => "filled",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed_out",
            Self::Settled => "settled",
        }
    }

    /// An order reached (or was due to reach) the trading client.
    pub fn is_order(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: String,
    pub timestamp_ms: u64,
    pub action: HistoryAction,
    pub status: HistoryStatus,
    pub symbol: String,
    pub condition_id: ConditionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread_cents: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_delta_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl_usd: Option<Decimal>,
}

impl HistoryEvent {
    /// New event with a fresh id and no optional fields.
    pub fn new(
        timestamp_ms: u64,
        action: HistoryAction,
        status: HistoryStatus,
        symbol: impl Into<String>,
        condition_id: ConditionId,
        simulated: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp_ms,
            action,
            status,
            symbol: symbol.into(),
            condition_id,
            outcome: None,
            reason: None,
            best_ask: None,
            best_bid: None,
            spread_cents: None,
            price: None,
            amount_usd: None,
            filled_size: None,
            order_id: None,
            success: matches!(status, HistoryStatus::Filled | HistoryStatus::Settled),
            error_msg: None,
            simulated,
            cash_delta_usd: None,
            realized_pnl_usd: None,
        }
    }

    /// Copy of this event under a new id and timestamp, for a later
    /// development of the same order.
    pub fn follow_up(&self, timestamp_ms: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp_ms,
            ..self.clone()
        }
    }

    pub fn with_status(mut self, status: HistoryStatus) -> Self {
        self.status = status;
        self.success = matches!(status, HistoryStatus::Filled | HistoryStatus::Settled);
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Top of book at decision time.
    pub fn with_quote(mut self, best_bid: Option<Price>, best_ask: Option<Price>) -> Self {
        self.best_bid = best_bid;
        self.best_ask = best_ask;
        self.spread_cents = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some(ask.cents() - bid.cents()),
            _ => None,
        };
        self
    }

    pub fn with_order(mut self, price: Price, amount_usd: Decimal) -> Self {
        self.price = Some(price);
        self.amount_usd = Some(amount_usd);
        self
    }

    pub fn with_fill(mut self, filled_size: Size, order_id: Option<String>) -> Self {
        self.filled_size = Some(filled_size);
        self.order_id = order_id;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_msg = Some(error.into());
        self
    }

    pub fn with_cash_delta(mut self, usd: Decimal) -> Self {
        self.cash_delta_usd = Some(usd);
        self
    }

    pub fn with_realized_pnl(mut self, usd: Decimal) -> Self {
        self.realized_pnl_usd = Some(usd);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_action_serde_names() {
        let json = serde_json::to_string(&HistoryAction::StopLoss2).unwrap();
        assert_eq!(json, "\"stop_loss_2\"");
        let action: HistoryAction = serde_json::from_str("\"panic_hedge\"").unwrap();
        assert_eq!(action, HistoryAction::PanicHedge);
        assert_eq!(HistoryAction::Settle.leg(), None);
        assert_eq!(HistoryAction::StopLoss1.leg(), Some(Leg::Exit));
    }

    #[test]
    fn test_quote_sets_spread() {
        let event = HistoryEvent::new(
            1,
            HistoryAction::Entry,
            HistoryStatus::Skipped,
            "BTC",
            ConditionId::from("0xabc"),
            false,
        )
        .with_quote(Some(Price::new(dec!(0.09))), Some(Price::new(dec!(0.12))));

        assert_eq!(event.spread_cents, Some(dec!(3)));
        assert!(!event.success);
    }

    #[test]
    fn test_follow_up_keeps_order_fields() {
        let first = HistoryEvent::new(
            1,
            HistoryAction::Hedge,
            HistoryStatus::TimedOut,
            "BTC",
            ConditionId::from("0xabc"),
            false,
        )
        .with_order(Price::new(dec!(0.77)), dec!(64))
        .with_error("no acknowledgement within 30ms");

        let later = first.follow_up(5).with_status(HistoryStatus::Filled);
        assert_ne!(later.id, first.id);
        assert_eq!(later.timestamp_ms, 5);
        assert_eq!(later.action, HistoryAction::Hedge);
        assert_eq!(later.amount_usd, Some(dec!(64)));
        assert!(later.success);
    }

    #[test]
    fn test_json_omits_unset_fields() {
        let event = HistoryEvent::new(
            1,
            HistoryAction::Hedge,
            HistoryStatus::Filled,
            "ETH",
            ConditionId::from("0xabc"),
            true,
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["status"], "filled");
        assert_eq!(json["success"], true);
        assert!(json.get("error_msg").is_none());

        let back: HistoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
