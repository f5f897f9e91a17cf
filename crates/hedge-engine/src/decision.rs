//! Pure decision functions.
//!
//! Given the config, a market or position, and the tick's books, decide what
//! to do. No I/O and no state mutation: the engine executes the result.
//!
//! Evaluation order for an entered position: expiry, hedge, panic hedge,
//! stop loss.

use crate::config::HedgeConfig;
use crate::decay::profit_target_cents;
use crate::gates::{check_buy, GateBlock, GateResult};
use crate::position::{ActivePosition, Phase, StopStage, DUST_SHARES};
use hedge_core::{
    cents_to_price, BookSet, BookSnapshot, ConditionId, Leg, MarketOrderArgs, MarketSnapshot,
    OrderSide, Price, Size, TokenId,
};
use hedge_ledger::HistoryAction;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Settlement threshold: a token whose last bid is at least this pays 1.
const SETTLE_THRESHOLD: Decimal = dec!(0.5);

/// Top of book for one token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
}

impl Quote {
    pub fn of(book: Option<&BookSnapshot>) -> Self {
        book.map_or_else(Self::default, |b| Self {
            best_bid: b.best_bid(),
            best_ask: b.best_ask(),
        })
    }
}

/// An order the engine should place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPlan {
    pub action: HistoryAction,
    pub outcome_index: usize,
    pub outcome_name: String,
    pub token_id: TokenId,
    pub side: OrderSide,
    /// Reference price: best ask for buys, best bid for sells.
    pub price: Price,
    /// USD for buys, shares for sells.
    pub amount: Decimal,
    pub quote: Quote,
    /// Ladder stage reached when a stop-loss sale fills.
    pub stop_stage: StopStage,
    pub reason: String,
}

impl OrderPlan {
    pub fn leg(&self) -> Leg {
        self.action.leg().unwrap_or(Leg::Entry)
    }

    pub fn amount_usd(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => self.amount,
            OrderSide::Sell => self.amount * self.price.inner(),
        }
    }

    pub fn order_args(&self, condition_id: &ConditionId) -> MarketOrderArgs {
        match self.side {
            OrderSide::Buy => MarketOrderArgs::buy(
                condition_id.clone(),
                self.token_id.clone(),
                self.amount,
                self.price,
            ),
            OrderSide::Sell => MarketOrderArgs::sell(
                condition_id.clone(),
                self.token_id.clone(),
                Size::new(self.amount),
                self.price,
            ),
        }
    }
}

/// A transition held back by a quality gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blocked {
    pub action: HistoryAction,
    pub outcome_index: usize,
    pub outcome_name: String,
    pub quote: Quote,
    pub block: GateBlock,
}

/// Per-share payouts at expiry (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub entry_payout: Decimal,
    pub hedge_payout: Decimal,
    pub entry_bid: Option<Price>,
    pub hedge_bid: Option<Price>,
}

impl Settlement {
    fn from_bids(entry_bid: Option<Price>, hedge_bid: Option<Price>) -> Self {
        let payout = |bid: Option<Price>| match bid {
            Some(p) if p.inner() >= SETTLE_THRESHOLD => Decimal::ONE,
            _ => Decimal::ZERO,
        };
        Self {
            entry_payout: payout(entry_bid),
            hedge_payout: payout(hedge_bid),
            entry_bid,
            hedge_bid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Hold,
    Execute(OrderPlan),
    Settle(Settlement),
}

/// Decision plus any gate that held a transition back this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub blocked: Option<Blocked>,
}

impl Evaluation {
    fn hold() -> Self {
        Self {
            decision: Decision::Hold,
            blocked: None,
        }
    }
}

/// Entry decision for a watched market.
///
/// The cheapest outcome whose best ask sits inside the cheap band and passes
/// the gates wins. Order size is `min(amount_usd, depth under the band ceiling)`.
pub fn evaluate_entry(
    config: &HedgeConfig,
    market: &MarketSnapshot,
    books: &BookSet,
    now_ms: u64,
) -> Evaluation {
    let secs = market.seconds_to_expire_at(now_ms);
    if secs < config.entry_min_sec || secs > config.entry_max_sec {
        return Evaluation::hold();
    }

    let mut candidates: Vec<(usize, &BookSnapshot, Price)> = (0..2)
        .filter_map(|i| {
            let book = books.get(&market.outcome_tokens[i].token_id)?;
            let ask = book.best_ask()?;
            let cents = ask.cents();
            (cents >= config.cheap_min_cents && cents <= config.cheap_max_cents)
                .then_some((i, book, ask))
        })
        .collect();
    candidates.sort_by_key(|(i, _, ask)| (*ask, *i));

    let tolerances = config.tolerances();
    let ceiling = cents_to_price(config.cheap_max_cents);
    let mut blocked = None;
    for (i, book, ask) in candidates {
        let token = &market.outcome_tokens[i];
        let quote = Quote::of(Some(book));
        match check_buy(
            book,
            ceiling,
            config.amount_usd,
            &tolerances,
            config.max_depth_levels,
        ) {
            GateResult::Pass(depth) => {
                return Evaluation {
                    decision: Decision::Execute(OrderPlan {
                        action: HistoryAction::Entry,
                        outcome_index: i,
                        outcome_name: token.outcome.clone(),
                        token_id: token.token_id.clone(),
                        side: OrderSide::Buy,
                        price: ask,
                        amount: config.amount_usd.min(depth.depth_usd),
                        quote,
                        stop_stage: StopStage::None,
                        reason: format!(
                            "ask {}c in {}-{}c, {}s to expiry",
                            ask.cents().normalize(),
                            config.cheap_min_cents,
                            config.cheap_max_cents,
                            secs
                        ),
                    }),
                    blocked: None,
                };
            }
            GateResult::Block(block) => {
                blocked.get_or_insert(Blocked {
                    action: HistoryAction::Entry,
                    outcome_index: i,
                    outcome_name: token.outcome.clone(),
                    quote,
                    block,
                });
            }
        }
    }

    Evaluation {
        decision: Decision::Hold,
        blocked,
    }
}

/// Decision for an open position.
pub fn evaluate_position(
    config: &HedgeConfig,
    position: &ActivePosition,
    books: &BookSet,
    now_ms: u64,
) -> Evaluation {
    let secs = position.seconds_to_expire_at(now_ms);
    let entry_book = books.get(&position.entry_token_id);
    let hedge_book = books.get(&position.hedge_token_id);
    let entry_quote = Quote::of(entry_book);
    let hedge_quote = Quote::of(hedge_book);

    if secs <= 0 {
        return Evaluation {
            decision: Decision::Settle(Settlement::from_bids(
                entry_quote.best_bid.or(position.last_entry_bid),
                hedge_quote.best_bid.or(position.last_hedge_bid),
            )),
            blocked: None,
        };
    }

    if position.phase != Phase::Entered {
        return Evaluation::hold();
    }
    let needed = position.hedge_needed();
    if needed.is_zero() {
        return Evaluation::hold();
    }

    let entry_cents = position.entry_price.cents();
    let hedge_outcome = MarketSnapshot::opposite(position.entry_outcome);
    let hedge_plan = |action: HistoryAction, ask: Price, reason: String| OrderPlan {
        action,
        outcome_index: hedge_outcome,
        outcome_name: position.hedge_outcome_name.clone(),
        token_id: position.hedge_token_id.clone(),
        side: OrderSide::Buy,
        price: ask,
        amount: needed.notional(ask),
        quote: hedge_quote,
        stop_stage: StopStage::None,
        reason,
    };

    let mut blocked = None;

    // Regular hedge under the profit ceiling.
    if let (Some(book), Some(ask)) = (hedge_book, hedge_quote.best_ask) {
        let tolerances = config.tolerances();
        let target = profit_target_cents(config, secs);
        let ceiling_cents = Decimal::ONE_HUNDRED - entry_cents - target - tolerances.buffer_cents;
        if ask.cents() <= ceiling_cents && secs >= config.min_sec_to_hedge {
            let reason = format!(
                "ask {}c <= ceiling {}c (target {}c), {}s to expiry",
                ask.cents().normalize(),
                ceiling_cents.normalize(),
                target.normalize(),
                secs
            );
            let plan = hedge_plan(HistoryAction::Hedge, ask, reason);
            if config.hedge_ignore_spread {
                return Evaluation {
                    decision: Decision::Execute(plan),
                    blocked: None,
                };
            }
            match check_buy(
                book,
                cents_to_price(ceiling_cents),
                plan.amount,
                &tolerances,
                config.max_depth_levels,
            ) {
                GateResult::Pass(_) => {
                    return Evaluation {
                        decision: Decision::Execute(plan),
                        blocked: None,
                    }
                }
                GateResult::Block(block) => {
                    blocked = Some(Blocked {
                        action: HistoryAction::Hedge,
                        outcome_index: hedge_outcome,
                        outcome_name: position.hedge_outcome_name.clone(),
                        quote: hedge_quote,
                        block,
                    });
                }
            }
        }
    }

    // Panic hedge: bypasses ceiling and quality gates.
    let panic = &config.panic_hedge;
    if panic.enabled && secs <= panic.start_sec {
        if let (Some(bid), Some(ask)) = (entry_quote.best_bid, hedge_quote.best_ask) {
            let loss = entry_cents - bid.cents();
            if loss >= panic.max_loss_cents {
                let reason = format!(
                    "loss {}c >= {}c, {}s to expiry",
                    loss.normalize(),
                    panic.max_loss_cents,
                    secs
                );
                return Evaluation {
                    decision: Decision::Execute(hedge_plan(HistoryAction::PanicHedge, ask, reason)),
                    blocked,
                };
            }
        }
    }

    // Stop loss on an unhedged entry.
    let stop = &config.stop_loss;
    if stop.enabled && secs >= stop.min_sec_to_exit && position.hedge_filled_shares.is_zero() {
        if let (Some(reference), Some(bid)) = (position.entry_bid, entry_quote.best_bid) {
            let drop = reference.cents() - bid.cents();
            let step = if drop >= stop.cut2_drop_cents && position.stop_stage < StopStage::Cut2 {
                Some((HistoryAction::StopLoss2, StopStage::Cut2, stop.cut2_sell_pct, stop.cut2_drop_cents))
            } else if drop >= stop.cut1_drop_cents && position.stop_stage == StopStage::None {
                Some((HistoryAction::StopLoss1, StopStage::Cut1, stop.cut1_sell_pct, stop.cut1_drop_cents))
            } else {
                None
            };

            if let Some((action, stage, sell_pct, threshold)) = step {
                let target_sold =
                    position.entry_filled_shares.inner() * sell_pct / Decimal::ONE_HUNDRED;
                let to_sell = (target_sold - position.sold_shares.inner())
                    .min(position.entry_held().inner());
                if to_sell > DUST_SHARES {
                    return Evaluation {
                        decision: Decision::Execute(OrderPlan {
                            action,
                            outcome_index: position.entry_outcome,
                            outcome_name: position.entry_outcome_name.clone(),
                            token_id: position.entry_token_id.clone(),
                            side: OrderSide::Sell,
                            price: bid,
                            amount: to_sell,
                            quote: entry_quote,
                            stop_stage: stage,
                            reason: format!(
                                "drop {}c >= {}c, selling to {}%",
                                drop.normalize(),
                                threshold,
                                sell_pct
                            ),
                        }),
                        blocked,
                    };
                }
            }
        }
    }

    Evaluation {
        decision: Decision::Hold,
        blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::{GATE_DEPTH, GATE_SPREAD};
    use hedge_core::{BookLevel, OutcomeToken, Timeframe};

    const NOW: u64 = 1_000_000;

    fn level(price: Decimal, size: Decimal) -> BookLevel {
        BookLevel::new(Price::new(price), Size::new(size))
    }

    fn book(token: &str, bid: Decimal, ask: Decimal) -> BookSnapshot {
        BookSnapshot::new(
            TokenId::from(token),
            vec![level(bid, dec!(1000))],
            vec![level(ask, dec!(1000))],
        )
    }

    fn books(up: BookSnapshot, down: BookSnapshot) -> BookSet {
        [up, down].into_iter().collect()
    }

    fn market(secs_left: u64) -> MarketSnapshot {
        MarketSnapshot::new(
            ConditionId::from("0xabc"),
            "BTC",
            Timeframe::M15,
            [OutcomeToken::new("Up", "up"), OutcomeToken::new("Down", "down")],
            NOW + secs_left * 1000,
            NOW,
        )
    }

    fn entered(secs_left: u64) -> ActivePosition {
        // Entered "Up" at 10c with 100 shares, bid 9c at the time.
        ActivePosition::open(
            &market(secs_left),
            0,
            Price::new(dec!(0.10)),
            Size::new(dec!(100)),
            dec!(10),
            false,
            NOW,
        )
        .with_entry_bid(Some(Price::new(dec!(0.09))))
    }

    fn plan(eval: &Evaluation) -> &OrderPlan {
        match &eval.decision {
            Decision::Execute(plan) => plan,
            other => panic!("expected execute, got {other:?}"),
        }
    }

    #[test]
    fn test_entry_picks_cheapest_in_band() {
        let config = HedgeConfig::default();
        let books = books(
            book("up", dec!(0.11), dec!(0.13)),
            book("down", dec!(0.09), dec!(0.10)),
        );

        let eval = evaluate_entry(&config, &market(600), &books, NOW);
        let plan = plan(&eval);
        assert_eq!(plan.action, HistoryAction::Entry);
        assert_eq!(plan.token_id, TokenId::from("down"));
        assert_eq!(plan.price, Price::new(dec!(0.10)));
        assert_eq!(plan.amount, dec!(10));
        assert_eq!(plan.leg(), Leg::Entry);
    }

    #[test]
    fn test_entry_outside_window_or_band_holds() {
        let config = HedgeConfig::default();
        let cheap = books(
            book("up", dec!(0.09), dec!(0.10)),
            book("down", dec!(0.88), dec!(0.90)),
        );
        assert_eq!(
            evaluate_entry(&config, &market(300), &cheap, NOW).decision,
            Decision::Hold
        );
        assert_eq!(
            evaluate_entry(&config, &market(901), &cheap, NOW).decision,
            Decision::Hold
        );

        let pricey = books(
            book("up", dec!(0.48), dec!(0.50)),
            book("down", dec!(0.48), dec!(0.50)),
        );
        let eval = evaluate_entry(&config, &market(600), &pricey, NOW);
        assert_eq!(eval, Evaluation::hold());
    }

    #[test]
    fn test_entry_inclusive_window_bounds() {
        let config = HedgeConfig::default();
        let cheap = books(
            book("up", dec!(0.14), dec!(0.15)),
            book("down", dec!(0.84), dec!(0.85)),
        );
        assert!(matches!(
            evaluate_entry(&config, &market(480), &cheap, NOW).decision,
            Decision::Execute(_)
        ));
        assert!(matches!(
            evaluate_entry(&config, &market(900), &cheap, NOW).decision,
            Decision::Execute(_)
        ));
    }

    #[test]
    fn test_entry_blocked_by_spread() {
        let config = HedgeConfig::default();
        let books = books(
            book("up", dec!(0.02), dec!(0.12)),
            book("down", dec!(0.85), dec!(0.88)),
        );

        let eval = evaluate_entry(&config, &market(600), &books, NOW);
        assert_eq!(eval.decision, Decision::Hold);
        let blocked = eval.blocked.unwrap();
        assert_eq!(blocked.block.kind, GATE_SPREAD);
        assert_eq!(blocked.outcome_name, "Up");
    }

    #[test]
    fn test_entry_sized_to_depth() {
        let config = HedgeConfig {
            mode: crate::config::RiskMode::Aggressive,
            ..HedgeConfig::default()
        };
        // $4 of asks under 15c: aggressive wants 20% of $10, order capped at $4.
        let thin = BookSnapshot::new(
            TokenId::from("up"),
            vec![level(dec!(0.09), dec!(10))],
            vec![level(dec!(0.10), dec!(40))],
        );
        let books = books(thin, book("down", dec!(0.85), dec!(0.88)));

        let eval = evaluate_entry(&config, &market(600), &books, NOW);
        assert_eq!(plan(&eval).amount, dec!(4.00));
    }

    #[test]
    fn test_hedge_under_ceiling() {
        let config = HedgeConfig::default();
        // ceiling = 100 - 10 - 10 - 0.5 = 79.5c
        let books = books(
            book("up", dec!(0.12), dec!(0.13)),
            book("down", dec!(0.78), dec!(0.79)),
        );

        let eval = evaluate_position(&config, &entered(600), &books, NOW);
        let plan = plan(&eval);
        assert_eq!(plan.action, HistoryAction::Hedge);
        assert_eq!(plan.token_id, TokenId::from("down"));
        assert_eq!(plan.amount, dec!(79));
        assert_eq!(plan.leg(), Leg::Hedge);
    }

    #[test]
    fn test_hedge_above_ceiling_or_too_late_holds() {
        let config = HedgeConfig::default();
        let books_high = books(
            book("up", dec!(0.12), dec!(0.13)),
            book("down", dec!(0.79), dec!(0.80)),
        );
        assert_eq!(
            evaluate_position(&config, &entered(600), &books_high, NOW).decision,
            Decision::Hold
        );

        let books_ok = books(
            book("up", dec!(0.12), dec!(0.13)),
            book("down", dec!(0.70), dec!(0.71)),
        );
        assert_eq!(
            evaluate_position(&config, &entered(89), &books_ok, NOW).decision,
            Decision::Hold
        );
    }

    #[test]
    fn test_hedge_blocked_by_depth_unless_ignored() {
        let mut config = HedgeConfig::default();
        let thin = BookSnapshot::new(
            TokenId::from("down"),
            vec![level(dec!(0.70), dec!(5))],
            vec![level(dec!(0.71), dec!(5))],
        );
        let books = books(book("up", dec!(0.20), dec!(0.21)), thin);

        let eval = evaluate_position(&config, &entered(600), &books, NOW);
        assert_eq!(eval.decision, Decision::Hold);
        assert_eq!(eval.blocked.unwrap().block.kind, GATE_DEPTH);

        config.hedge_ignore_spread = true;
        let eval = evaluate_position(&config, &entered(600), &books, NOW);
        assert_eq!(plan(&eval).action, HistoryAction::Hedge);
    }

    #[test]
    fn test_panic_hedge_bypasses_ceiling() {
        let mut config = HedgeConfig::default();
        config.panic_hedge.enabled = true;
        // Entry at 10c, bid fell to 1c (-9c), hedge ask 98c far above ceiling.
        config.panic_hedge.max_loss_cents = dec!(5);
        let books = books(
            book("up", dec!(0.01), dec!(0.02)),
            book("down", dec!(0.97), dec!(0.98)),
        );

        let eval = evaluate_position(&config, &entered(100), &books, NOW);
        assert_eq!(plan(&eval).action, HistoryAction::PanicHedge);

        let early = evaluate_position(&config, &entered(300), &books, NOW);
        assert_eq!(early.decision, Decision::Hold);
    }

    #[test]
    fn test_stop_loss_ladder() {
        let mut config = HedgeConfig::default();
        config.stop_loss.enabled = true;
        let one_cent_drop = books(
            book("up", dec!(0.08), dec!(0.09)),
            book("down", dec!(0.89), dec!(0.91)),
        );
        let pos = entered(600);

        let eval = evaluate_position(&config, &pos, &one_cent_drop, NOW);
        let plan1 = plan(&eval);
        assert_eq!(plan1.action, HistoryAction::StopLoss1);
        assert_eq!(plan1.side, OrderSide::Sell);
        assert_eq!(plan1.amount, dec!(50));
        assert_eq!(plan1.price, Price::new(dec!(0.08)));
        assert_eq!(plan1.leg(), Leg::Exit);

        // After cut1 the same drop does nothing more.
        let mut after_cut1 = pos.clone();
        after_cut1.record_sale(Size::new(dec!(50)), dec!(4), StopStage::Cut1);
        assert_eq!(
            evaluate_position(&config, &after_cut1, &one_cent_drop, NOW).decision,
            Decision::Hold
        );

        let two_cent_drop = books(
            book("up", dec!(0.07), dec!(0.08)),
            book("down", dec!(0.90), dec!(0.92)),
        );
        let eval = evaluate_position(&config, &after_cut1, &two_cent_drop, NOW);
        let plan2 = plan(&eval);
        assert_eq!(plan2.action, HistoryAction::StopLoss2);
        assert_eq!(plan2.amount, dec!(50));
    }

    #[test]
    fn test_stop_loss_holds_on_unchanged_book() {
        let mut config = HedgeConfig::default();
        config.stop_loss.enabled = true;

        // Spread at entry is not a drop.
        let unchanged = books(
            book("up", dec!(0.09), dec!(0.10)),
            book("down", dec!(0.89), dec!(0.91)),
        );
        assert_eq!(
            evaluate_position(&config, &entered(600), &unchanged, NOW).decision,
            Decision::Hold
        );

        // A 2c spread at entry, book unchanged since.
        let wide = entered(600).with_entry_bid(Some(Price::new(dec!(0.08))));
        let wide_book = books(
            book("up", dec!(0.08), dec!(0.10)),
            book("down", dec!(0.89), dec!(0.91)),
        );
        assert_eq!(
            evaluate_position(&config, &wide, &wide_book, NOW).decision,
            Decision::Hold
        );
    }

    #[test]
    fn test_stop_loss_waits_for_reference_bid() {
        let mut config = HedgeConfig::default();
        config.stop_loss.enabled = true;
        let no_reference = entered(600).with_entry_bid(None);
        let low = books(
            book("up", dec!(0.05), dec!(0.06)),
            book("down", dec!(0.93), dec!(0.95)),
        );
        assert_eq!(
            evaluate_position(&config, &no_reference, &low, NOW).decision,
            Decision::Hold
        );
    }

    #[test]
    fn test_stop_loss_respects_min_sec_to_exit() {
        let mut config = HedgeConfig::default();
        config.stop_loss.enabled = true;
        let books = books(
            book("up", dec!(0.05), dec!(0.06)),
            book("down", dec!(0.93), dec!(0.95)),
        );
        assert_eq!(
            evaluate_position(&config, &entered(20), &books, NOW).decision,
            Decision::Hold
        );
    }

    #[test]
    fn test_expiry_settles_from_last_bids() {
        let config = HedgeConfig::default();
        let mut pos = entered(10);
        pos.last_entry_bid = Some(Price::new(dec!(0.97)));
        pos.last_hedge_bid = Some(Price::new(dec!(0.02)));

        let eval = evaluate_position(&config, &pos, &BookSet::new(), NOW + 10_000);
        match eval.decision {
            Decision::Settle(s) => {
                assert_eq!(s.entry_payout, Decimal::ONE);
                assert_eq!(s.hedge_payout, Decimal::ZERO);
            }
            other => panic!("expected settle, got {other:?}"),
        }
    }
}
