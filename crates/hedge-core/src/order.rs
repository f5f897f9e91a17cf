//! Order types.

use crate::{ConditionId, Price, Size, TokenId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical trading action on a market. Together with the condition id it
/// forms the execution lock key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Entry,
    Hedge,
    Exit,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Hedge => "hedge",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Market order request.
///
/// `amount` is USD notional for buys and shares for sells.
/// `reference_price` is the book price the decision was made at; it bounds
/// slippage for live orders and is the fill price for simulated ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOrderArgs {
    pub condition_id: ConditionId,
    pub token_id: TokenId,
    pub side: OrderSide,
    pub amount: Decimal,
    pub reference_price: Price,
}

impl MarketOrderArgs {
    #[must_use]
    pub fn buy(condition_id: ConditionId, token_id: TokenId, usd: Decimal, price: Price) -> Self {
        Self {
            condition_id,
            token_id,
            side: OrderSide::Buy,
            amount: usd,
            reference_price: price,
        }
    }

    #[must_use]
    pub fn sell(condition_id: ConditionId, token_id: TokenId, shares: Size, price: Price) -> Self {
        Self {
            condition_id,
            token_id,
            side: OrderSide::Sell,
            amount: shares.inner(),
            reference_price: price,
        }
    }
}

/// Trading client acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub success: bool,
    pub order_id: Option<String>,
    pub filled_size: Option<Size>,
    pub avg_price: Option<Price>,
}

impl OrderAck {
    /// Shares filled. When the client does not report a size, buys are
    /// estimated at the reference price and sells as fully filled.
    pub fn filled_shares(&self, args: &MarketOrderArgs) -> Size {
        if let Some(size) = self.filled_size {
            return size;
        }
        match args.side {
            OrderSide::Buy => Size::from_notional(args.amount, self.fill_price(args)),
            OrderSide::Sell => Size::new(args.amount),
        }
    }

    /// Average fill price, falling back to the reference price.
    pub fn fill_price(&self, args: &MarketOrderArgs) -> Price {
        self.avg_price
            .filter(Price::is_positive)
            .unwrap_or(args.reference_price)
    }
}
