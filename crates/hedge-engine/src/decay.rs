//! Decayed profit target.

use crate::config::{DecayMode, HedgeConfig, ProfitDecayConfig};
use rust_decimal::{Decimal, RoundingStrategy};

/// Profit target (cents) at `secs` seconds to expiry.
pub fn profit_target_cents(config: &HedgeConfig, secs: i64) -> Decimal {
    if !config.profit_decay.enabled {
        return config.target_profit_cents;
    }
    decayed_cents(&config.profit_decay, secs)
}

/// Interpolate between `start_cents` at `start_sec` and `end_cents` at
/// `end_sec`, clamped to the nearer endpoint outside that range, then
/// quantized to `step_cents`.
pub fn decayed_cents(decay: &ProfitDecayConfig, secs: i64) -> Decimal {
    let raw = if secs >= decay.start_sec {
        decay.start_cents
    } else if secs <= decay.end_sec {
        decay.end_cents
    } else {
        let elapsed = decay.start_sec - secs;
        match decay.mode {
            DecayMode::Linear => {
                let span = Decimal::from(decay.start_sec - decay.end_sec);
                decay.start_cents
                    + (decay.end_cents - decay.start_cents) * Decimal::from(elapsed) / span
            }
            DecayMode::PerMinute => {
                let moved = decay.per_min_cents * Decimal::from(elapsed / 60);
                if decay.end_cents < decay.start_cents {
                    (decay.start_cents - moved).max(decay.end_cents)
                } else {
                    (decay.start_cents + moved).min(decay.end_cents)
                }
            }
        }
    };
    quantize(raw, decay.step_cents)
}

fn quantize(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn decay(mode: DecayMode) -> ProfitDecayConfig {
        ProfitDecayConfig {
            enabled: true,
            mode,
            per_min_cents: dec!(1),
            start_cents: dec!(10),
            end_cents: dec!(6),
            start_sec: 300,
            end_sec: 60,
            step_cents: dec!(0.1),
        }
    }

    #[test]
    fn test_disabled_uses_fixed_target() {
        let config = HedgeConfig::default();
        assert_eq!(profit_target_cents(&config, 10), dec!(10));
    }

    #[test]
    fn test_linear_endpoints_and_midpoint() {
        let d = decay(DecayMode::Linear);
        assert_eq!(decayed_cents(&d, 900), dec!(10));
        assert_eq!(decayed_cents(&d, 300), dec!(10));
        assert_eq!(decayed_cents(&d, 180), dec!(8));
        assert_eq!(decayed_cents(&d, 60), dec!(6));
        assert_eq!(decayed_cents(&d, -5), dec!(6));
    }

    #[test]
    fn test_per_minute_steps() {
        let d = decay(DecayMode::PerMinute);
        assert_eq!(decayed_cents(&d, 299), dec!(10));
        assert_eq!(decayed_cents(&d, 240), dec!(9));
        assert_eq!(decayed_cents(&d, 179), dec!(8));
        assert_eq!(decayed_cents(&d, 61), dec!(7));
        assert_eq!(decayed_cents(&d, 60), dec!(6));
    }

    #[test]
    fn test_quantized_to_step() {
        let mut d = decay(DecayMode::Linear);
        d.step_cents = dec!(0.5);
        // 300 -> 60 over 4c: at 290s raw target is 9.8333
        assert_eq!(decayed_cents(&d, 290), dec!(10.0));
        d.step_cents = dec!(0.25);
        assert_eq!(decayed_cents(&d, 290), dec!(9.75));
    }

    #[test]
    fn test_non_increasing_toward_expiry() {
        for mode in [DecayMode::Linear, DecayMode::PerMinute] {
            let d = decay(mode);
            let mut prev = decayed_cents(&d, 400);
            for secs in (0..400).rev() {
                let cur = decayed_cents(&d, secs);
                assert!(cur <= prev, "{mode:?} increased at {secs}s: {prev} -> {cur}");
                prev = cur;
            }
        }
    }
}
