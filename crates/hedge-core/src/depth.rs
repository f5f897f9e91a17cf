//! Book depth estimation.
//!
//! Answers "how much USD notional can be bought at or below a ceiling" so
//! order sizes never exceed what the book can absorb.

use crate::{BookLevel, Price};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Level cap used when the caller does not supply one.
pub const DEFAULT_MAX_LEVELS: usize = 200;

/// Overshoot allowance on the target so a boundary level is counted in full.
const TARGET_OVERSHOOT: Decimal = dec!(1.02);

/// Result of a depth walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AskDepth {
    pub depth_usd: Decimal,
    pub levels_used: usize,
}

/// Accumulate ask notional at or below `limit_price`.
///
/// # Arguments
/// * `asks` - Raw ask levels in any order
/// * `limit_price` - Inclusive price ceiling
/// * `target_usd` - Stop once depth reaches `target * 1.02` (ignored when not positive)
/// * `max_levels` - Level cap, clamped to at least 1
pub fn compute_ask_depth(
    asks: &[BookLevel],
    limit_price: Price,
    target_usd: Option<Decimal>,
    max_levels: usize,
) -> AskDepth {
    let mut levels: Vec<&BookLevel> = asks
        .iter()
        .filter(|l| l.price.is_positive() && l.size.is_positive() && l.price <= limit_price)
        .collect();
    levels.sort_by(|a, b| a.price.cmp(&b.price));
    accumulate(levels, target_usd, max_levels)
}

/// Mirror of [`compute_ask_depth`] for exits: bid notional at or above `floor_price`.
pub fn compute_bid_depth(
    bids: &[BookLevel],
    floor_price: Price,
    target_usd: Option<Decimal>,
    max_levels: usize,
) -> AskDepth {
    let mut levels: Vec<&BookLevel> = bids
        .iter()
        .filter(|l| l.price.is_positive() && l.size.is_positive() && l.price >= floor_price)
        .collect();
    levels.sort_by(|a, b| b.price.cmp(&a.price));
    accumulate(levels, target_usd, max_levels)
}

fn accumulate(levels: Vec<&BookLevel>, target_usd: Option<Decimal>, max_levels: usize) -> AskDepth {
    let max_levels = max_levels.max(1);
    let stop_at = target_usd
        .filter(|t| t.is_sign_positive() && !t.is_zero())
        .map(|t| t * TARGET_OVERSHOOT);

    let mut depth = AskDepth::default();
    for level in levels {
        if depth.levels_used >= max_levels {
            break;
        }
        depth.depth_usd += level.notional();
        depth.levels_used += 1;
        if stop_at.is_some_and(|stop| depth.depth_usd >= stop) {
            break;
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Size;

    fn level(price: Decimal, size: Decimal) -> BookLevel {
        BookLevel::new(Price::new(price), Size::new(size))
    }

    #[test]
    fn test_depth_crosses_into_second_batch() {
        let mut asks: Vec<BookLevel> = (0..10).map(|_| level(dec!(0.999), dec!(2))).collect();
        asks.extend((0..50).map(|_| level(dec!(0.999), dec!(1))));

        let depth = compute_ask_depth(&asks, Price::new(dec!(0.999)), Some(dec!(50)), 200);

        assert!(depth.depth_usd >= dec!(50));
        assert!(depth.levels_used > 10);
        // 19.98 from the first batch, then 32 levels of 0.999 to pass 51.
        assert_eq!(depth.levels_used, 42);
    }

    #[test]
    fn test_depth_filters_above_limit() {
        let asks = vec![
            level(dec!(0.10), dec!(100)),
            level(dec!(0.20), dec!(100)),
            level(dec!(0.16), dec!(100)),
        ];
        let depth = compute_ask_depth(&asks, Price::new(dec!(0.16)), None, 200);

        assert_eq!(depth.levels_used, 2);
        assert_eq!(depth.depth_usd, dec!(26));
    }

    #[test]
    fn test_depth_without_target_consumes_to_max_levels() {
        let asks: Vec<BookLevel> = (0..5).map(|_| level(dec!(0.5), dec!(2))).collect();

        let depth = compute_ask_depth(&asks, Price::ONE, None, 3);
        assert_eq!(depth.levels_used, 3);
        assert_eq!(depth.depth_usd, dec!(3));

        let clamped = compute_ask_depth(&asks, Price::ONE, None, 0);
        assert_eq!(clamped.levels_used, 1);
    }

    #[test]
    fn test_depth_ignores_non_positive_levels() {
        let asks = vec![
            level(dec!(0), dec!(10)),
            level(dec!(0.3), dec!(0)),
            level(dec!(0.3), dec!(-1)),
        ];
        let depth = compute_ask_depth(&asks, Price::ONE, Some(dec!(10)), 200);
        assert_eq!(depth, AskDepth::default());
    }

    #[test]
    fn test_depth_zero_target_means_no_target() {
        let asks: Vec<BookLevel> = (0..4).map(|_| level(dec!(0.5), dec!(2))).collect();
        let depth = compute_ask_depth(&asks, Price::ONE, Some(Decimal::ZERO), 200);
        assert_eq!(depth.levels_used, 4);
    }

    #[test]
    fn test_bid_depth_walks_down_from_best() {
        let bids = vec![
            level(dec!(0.40), dec!(10)),
            level(dec!(0.45), dec!(10)),
            level(dec!(0.30), dec!(10)),
        ];
        let depth = compute_bid_depth(&bids, Price::new(dec!(0.40)), None, 200);
        assert_eq!(depth.levels_used, 2);
        assert_eq!(depth.depth_usd, dec!(8.5));
    }
}
