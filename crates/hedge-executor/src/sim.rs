//! Simulated book.
//!
//! `SimLedger` tracks virtual cash and share balances. `SimulatedTradingClient`
//! fills market orders against it at the reference price, so the engine runs
//! the same evaluation with no external calls.

use crate::client::TradingClient;
use crate::error::{ExecutorError, ExecutorResult};
use hedge_core::{BoxFuture, MarketOrderArgs, OrderAck, OrderSide, Price, Size, TokenId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Virtual cash and positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimLedger {
    pub initial_usdc: Decimal,
    pub cash_usdc: Decimal,
    pub positions_by_token_id: HashMap<TokenId, Size>,
}

impl SimLedger {
    #[must_use]
    pub fn new(initial_usdc: Decimal) -> Self {
        Self {
            initial_usdc,
            cash_usdc: initial_usdc,
            positions_by_token_id: HashMap::new(),
        }
    }

    /// Start over with a fresh balance.
    pub fn reset(&mut self, initial_usdc: Decimal) {
        *self = Self::new(initial_usdc);
    }

    pub fn position(&self, token_id: &TokenId) -> Size {
        self.positions_by_token_id
            .get(token_id)
            .copied()
            .unwrap_or(Size::ZERO)
    }

    /// Debit `usd` and credit `usd / price` shares.
    pub fn buy(&mut self, token_id: &TokenId, usd: Decimal, price: Price) -> ExecutorResult<Size> {
        if !price.is_positive() || usd <= Decimal::ZERO {
            return Err(ExecutorError::InvalidOrder(format!(
                "buy {usd} USD at {price}"
            )));
        }
        if usd > self.cash_usdc {
            return Err(ExecutorError::InsufficientFunds {
                needed: usd,
                available: self.cash_usdc,
            });
        }
        let shares = Size::from_notional(usd, price);
        self.cash_usdc -= usd;
        let total = self.position(token_id) + shares;
        self.set_position(token_id, total);
        Ok(shares)
    }

    /// Remove `shares` and credit `shares * price`.
    pub fn sell(&mut self, token_id: &TokenId, shares: Size, price: Price) -> ExecutorResult<Decimal> {
        if !shares.is_positive() || price.is_zero() || price.0.is_sign_negative() {
            return Err(ExecutorError::InvalidOrder(format!(
                "sell {shares} at {price}"
            )));
        }
        let held = self.position(token_id);
        if shares > held {
            return Err(ExecutorError::InsufficientShares {
                needed: shares.inner(),
                available: held.inner(),
            });
        }
        let proceeds = shares.notional(price);
        self.cash_usdc += proceeds;
        self.set_position(token_id, held - shares);
        Ok(proceeds)
    }

    /// Close out a token at settlement, crediting `payout` per share (0 or 1).
    pub fn settle(&mut self, token_id: &TokenId, payout: Decimal) -> Decimal {
        let held = self.position(token_id);
        self.positions_by_token_id.remove(token_id);
        let credit = held.inner() * payout;
        self.cash_usdc += credit;
        credit
    }

    /// Cash plus positions marked at `mark` (unknown marks count as zero).
    pub fn equity<F>(&self, mark: F) -> Decimal
    where
        F: Fn(&TokenId) -> Option<Price>,
    {
        self.cash_usdc
            + self
                .positions_by_token_id
                .iter()
                .map(|(token, size)| mark(token).map_or(Decimal::ZERO, |p| size.notional(p)))
                .sum::<Decimal>()
    }

    fn set_position(&mut self, token_id: &TokenId, size: Size) {
        if size.is_positive() {
            self.positions_by_token_id.insert(token_id.clone(), size);
        } else {
            self.positions_by_token_id.remove(token_id);
        }
    }
}

/// Shared handle to a simulated ledger.
pub type SharedSimLedger = Arc<Mutex<SimLedger>>;

/// Trading client that fills against a [`SimLedger`].
pub struct SimulatedTradingClient {
    ledger: SharedSimLedger,
}

impl SimulatedTradingClient {
    #[must_use]
    pub fn new(ledger: SharedSimLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> SharedSimLedger {
        Arc::clone(&self.ledger)
    }

    fn fill(&self, args: &MarketOrderArgs) -> ExecutorResult<OrderAck> {
        let mut ledger = self.ledger.lock();
        let shares = match args.side {
            OrderSide::Buy => ledger.buy(&args.token_id, args.amount, args.reference_price)?,
            OrderSide::Sell => {
                let shares = Size::new(args.amount);
                ledger.sell(&args.token_id, shares, args.reference_price)?;
                shares
            }
        };
        debug!(
            token = %args.token_id,
            side = %args.side,
            shares = %shares,
            price = %args.reference_price,
            cash = %ledger.cash_usdc,
            "Simulated fill"
        );
        Ok(OrderAck {
            success: true,
            order_id: Some(format!("sim-{}", uuid::Uuid::new_v4())),
            filled_size: Some(shares),
            avg_price: Some(args.reference_price),
        })
    }
}

impl TradingClient for SimulatedTradingClient {
    fn create_market_order(&self, args: MarketOrderArgs) -> BoxFuture<'_, ExecutorResult<OrderAck>> {
        let result = self.fill(&args);
        Box::pin(async move { result })
    }

    fn name(&self) -> &'static str {
        "sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedge_core::ConditionId;
    use rust_decimal_macros::dec;

    fn token(id: &str) -> TokenId {
        TokenId::from(id)
    }

    #[test]
    fn test_buy_debits_cash() {
        let mut ledger = SimLedger::new(dec!(1000));
        let shares = ledger.buy(&token("up"), dec!(10), Price::new(dec!(0.10))).unwrap();

        assert_eq!(shares.inner(), dec!(100));
        assert_eq!(ledger.cash_usdc, dec!(990));
        assert_eq!(ledger.position(&token("up")).inner(), dec!(100));
    }

    #[test]
    fn test_buy_rejects_overdraft() {
        let mut ledger = SimLedger::new(dec!(5));
        let err = ledger
            .buy(&token("up"), dec!(10), Price::new(dec!(0.5)))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InsufficientFunds { .. }));
        assert_eq!(ledger.cash_usdc, dec!(5));
    }

    #[test]
    fn test_sell_and_settle() {
        let mut ledger = SimLedger::new(dec!(100));
        ledger.buy(&token("up"), dec!(10), Price::new(dec!(0.10))).unwrap();

        let proceeds = ledger
            .sell(&token("up"), Size::new(dec!(50)), Price::new(dec!(0.08)))
            .unwrap();
        assert_eq!(proceeds, dec!(4));
        assert_eq!(ledger.cash_usdc, dec!(94));

        let credit = ledger.settle(&token("up"), Decimal::ONE);
        assert_eq!(credit, dec!(50));
        assert_eq!(ledger.cash_usdc, dec!(144));
        assert!(ledger.positions_by_token_id.is_empty());
    }

    #[test]
    fn test_sell_more_than_held() {
        let mut ledger = SimLedger::new(dec!(100));
        let err = ledger
            .sell(&token("up"), Size::new(dec!(1)), Price::new(dec!(0.5)))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InsufficientShares { .. }));
    }

    #[test]
    fn test_equity_marks_positions() {
        let mut ledger = SimLedger::new(dec!(100));
        ledger.buy(&token("up"), dec!(10), Price::new(dec!(0.10))).unwrap();

        let equity = ledger.equity(|_| Some(Price::new(dec!(0.2))));
        assert_eq!(equity, dec!(110));
        assert_eq!(ledger.equity(|_| None), dec!(90));
    }

    #[tokio::test]
    async fn test_simulated_client_fills_at_reference_price() {
        let ledger = Arc::new(Mutex::new(SimLedger::new(dec!(1000))));
        let client = SimulatedTradingClient::new(Arc::clone(&ledger));

        let args = MarketOrderArgs::buy(
            ConditionId::from("0xabc"),
            token("up"),
            dec!(12),
            Price::new(dec!(0.12)),
        );
        let ack = client.create_market_order(args).await.unwrap();

        assert!(ack.success);
        assert_eq!(ack.filled_size, Some(Size::new(dec!(100))));
        assert!(ack.order_id.unwrap().starts_with("sim-"));
        assert_eq!(ledger.lock().cash_usdc, dec!(988));
    }

    #[test]
    fn test_simulated_client_rejects_overdraft() {
        let ledger = Arc::new(Mutex::new(SimLedger::new(dec!(5))));
        let client = SimulatedTradingClient::new(Arc::clone(&ledger));

        let args = MarketOrderArgs::buy(
            ConditionId::from("0xabc"),
            token("up"),
            dec!(10),
            Price::new(dec!(0.5)),
        );
        let err = tokio_test::block_on(client.create_market_order(args)).unwrap_err();

        assert!(matches!(err, ExecutorError::InsufficientFunds { .. }));
        assert_eq!(ledger.lock().cash_usdc, dec!(5));
    }
}
