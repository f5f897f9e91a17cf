//! Hedge strategy configuration.
//!
//! Every field has a serde default so partial TOML/JSON documents load.
//! Out-of-range values are clamped by [`HedgeConfig::normalized`] rather
//! than rejected.

use hedge_core::Timeframe;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk appetite, mapping to spread/depth/buffer tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskMode {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

/// Effective quality-gate tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskTolerances {
    pub max_spread_cents: Decimal,
    pub min_depth_pct: Decimal,
    pub buffer_cents: Decimal,
}

impl RiskMode {
    pub fn tolerances(&self) -> RiskTolerances {
        let (max_spread_cents, min_depth_pct, buffer_cents) = match self {
            Self::Conservative => (dec!(2), dec!(100), dec!(1.0)),
            Self::Balanced => (dec!(4), dec!(50), dec!(0.5)),
            Self::Aggressive => (dec!(8), dec!(20), dec!(0.0)),
        };
        RiskTolerances {
            max_spread_cents,
            min_depth_pct,
            buffer_cents,
        }
    }
}

/// Decay curve shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    #[default]
    Linear,
    PerMinute,
}

/// Time-decaying profit target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitDecayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: DecayMode,
    /// Step per elapsed minute in `per_minute` mode.
    #[serde(default = "default_decay_per_min_cents")]
    pub per_min_cents: Decimal,
    /// Target at `start_sec` seconds to expiry.
    #[serde(default = "default_decay_start_cents")]
    pub start_cents: Decimal,
    /// Target at `end_sec` seconds to expiry.
    #[serde(default = "default_decay_end_cents")]
    pub end_cents: Decimal,
    #[serde(default = "default_decay_start_sec")]
    pub start_sec: i64,
    #[serde(default = "default_decay_end_sec")]
    pub end_sec: i64,
    /// Quantization step.
    #[serde(default = "default_decay_step_cents")]
    pub step_cents: Decimal,
}

fn default_decay_per_min_cents() -> Decimal {
    dec!(1)
}

fn default_decay_start_cents() -> Decimal {
    dec!(10)
}

fn default_decay_end_cents() -> Decimal {
    dec!(9)
}

fn default_decay_start_sec() -> i64 {
    300
}

fn default_decay_end_sec() -> i64 {
    60
}

fn default_decay_step_cents() -> Decimal {
    dec!(0.1)
}

impl Default for ProfitDecayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: DecayMode::default(),
            per_min_cents: default_decay_per_min_cents(),
            start_cents: default_decay_start_cents(),
            end_cents: default_decay_end_cents(),
            start_sec: default_decay_start_sec(),
            end_sec: default_decay_end_sec(),
            step_cents: default_decay_step_cents(),
        }
    }
}

/// Two-level stop-loss ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopLossConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cut1_drop_cents")]
    pub cut1_drop_cents: Decimal,
    #[serde(default = "default_cut1_sell_pct")]
    pub cut1_sell_pct: Decimal,
    #[serde(default = "default_cut2_drop_cents")]
    pub cut2_drop_cents: Decimal,
    /// Cumulative share of the entry sold once cut2 fires.
    #[serde(default = "default_cut2_sell_pct")]
    pub cut2_sell_pct: Decimal,
    /// No stop-loss exits with less time than this to expiry.
    #[serde(default = "default_min_sec_to_exit")]
    pub min_sec_to_exit: i64,
}

fn default_cut1_drop_cents() -> Decimal {
    dec!(1)
}

fn default_cut1_sell_pct() -> Decimal {
    dec!(50)
}

fn default_cut2_drop_cents() -> Decimal {
    dec!(2)
}

fn default_cut2_sell_pct() -> Decimal {
    dec!(100)
}

fn default_min_sec_to_exit() -> i64 {
    25
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cut1_drop_cents: default_cut1_drop_cents(),
            cut1_sell_pct: default_cut1_sell_pct(),
            cut2_drop_cents: default_cut2_drop_cents(),
            cut2_sell_pct: default_cut2_sell_pct(),
            min_sec_to_exit: default_min_sec_to_exit(),
        }
    }
}

/// Forced hedge near expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicHedgeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_panic_start_sec")]
    pub start_sec: i64,
    #[serde(default = "default_panic_max_loss_cents")]
    pub max_loss_cents: Decimal,
}

fn default_panic_start_sec() -> i64 {
    120
}

fn default_panic_max_loss_cents() -> Decimal {
    dec!(20)
}

impl Default for PanicHedgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_sec: default_panic_start_sec(),
            max_loss_cents: default_panic_max_loss_cents(),
        }
    }
}

/// Simulated book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sim_initial_usdc")]
    pub initial_usdc: Decimal,
}

fn default_sim_initial_usdc() -> Decimal {
    dec!(1000)
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_usdc: default_sim_initial_usdc(),
        }
    }
}

/// Strategy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HedgeConfig {
    /// Tick period (ms).
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
    /// Entry order size (USD).
    #[serde(default = "default_amount_usd")]
    pub amount_usd: Decimal,
    /// Entry window, in seconds to expiry (inclusive).
    #[serde(default = "default_entry_min_sec")]
    pub entry_min_sec: i64,
    #[serde(default = "default_entry_max_sec")]
    pub entry_max_sec: i64,
    /// Entry price band (inclusive).
    #[serde(default = "default_cheap_min_cents")]
    pub cheap_min_cents: Decimal,
    #[serde(default = "default_cheap_max_cents")]
    pub cheap_max_cents: Decimal,
    /// Fixed profit target when decay is off.
    #[serde(default = "default_target_profit_cents")]
    pub target_profit_cents: Decimal,
    #[serde(default)]
    pub profit_decay: ProfitDecayConfig,
    #[serde(default)]
    pub mode: RiskMode,
    /// Mode overrides.
    #[serde(default)]
    pub buffer_cents: Option<Decimal>,
    #[serde(default)]
    pub max_spread_cents: Option<Decimal>,
    #[serde(default)]
    pub min_depth_pct: Option<Decimal>,
    #[serde(default = "default_min_sec_to_hedge")]
    pub min_sec_to_hedge: i64,
    #[serde(default)]
    pub hedge_ignore_spread: bool,
    #[serde(default)]
    pub stop_loss: StopLossConfig,
    #[serde(default)]
    pub panic_hedge: PanicHedgeConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default = "default_max_depth_levels")]
    pub max_depth_levels: usize,
}

fn default_poll_ms() -> u64 {
    2000
}

fn default_symbols() -> Vec<String> {
    ["BTC", "ETH", "SOL", "XRP"].iter().map(|s| s.to_string()).collect()
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M15]
}

fn default_amount_usd() -> Decimal {
    dec!(10)
}

fn default_entry_min_sec() -> i64 {
    480
}

fn default_entry_max_sec() -> i64 {
    900
}

fn default_cheap_min_cents() -> Decimal {
    dec!(8)
}

fn default_cheap_max_cents() -> Decimal {
    dec!(15)
}

fn default_target_profit_cents() -> Decimal {
    dec!(10)
}

fn default_min_sec_to_hedge() -> i64 {
    90
}

fn default_max_depth_levels() -> usize {
    hedge_core::DEFAULT_MAX_LEVELS
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            symbols: default_symbols(),
            timeframes: default_timeframes(),
            amount_usd: default_amount_usd(),
            entry_min_sec: default_entry_min_sec(),
            entry_max_sec: default_entry_max_sec(),
            cheap_min_cents: default_cheap_min_cents(),
            cheap_max_cents: default_cheap_max_cents(),
            target_profit_cents: default_target_profit_cents(),
            profit_decay: ProfitDecayConfig::default(),
            mode: RiskMode::default(),
            buffer_cents: None,
            max_spread_cents: None,
            min_depth_pct: None,
            min_sec_to_hedge: default_min_sec_to_hedge(),
            hedge_ignore_spread: false,
            stop_loss: StopLossConfig::default(),
            panic_hedge: PanicHedgeConfig::default(),
            sim: SimConfig::default(),
            max_depth_levels: default_max_depth_levels(),
        }
    }
}

const MAX_SEC: i64 = 86_400;
const MAX_CENTS: Decimal = dec!(99);
const MAX_PCT: Decimal = dec!(100);

fn clamp_dec(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    value.max(lo).min(hi)
}

fn dedupe<T: PartialEq>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    *items = seen;
}

fn ordered<T: PartialOrd>(a: &mut T, b: &mut T) {
    if *a > *b {
        std::mem::swap(a, b);
    }
}

impl HedgeConfig {
    /// Clamp every field into its valid range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.poll_ms = self.poll_ms.clamp(250, 120_000);

        let mut symbols: Vec<String> = self
            .symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        dedupe(&mut symbols);
        self.symbols = if symbols.is_empty() {
            default_symbols()
        } else {
            symbols
        };

        dedupe(&mut self.timeframes);
        if self.timeframes.is_empty() {
            self.timeframes = default_timeframes();
        }

        self.amount_usd = clamp_dec(self.amount_usd, dec!(0.01), dec!(1000000));

        self.entry_min_sec = self.entry_min_sec.clamp(0, MAX_SEC);
        self.entry_max_sec = self.entry_max_sec.clamp(0, MAX_SEC);
        ordered(&mut self.entry_min_sec, &mut self.entry_max_sec);

        self.cheap_min_cents = clamp_dec(self.cheap_min_cents, Decimal::ONE, MAX_CENTS);
        self.cheap_max_cents = clamp_dec(self.cheap_max_cents, Decimal::ONE, MAX_CENTS);
        ordered(&mut self.cheap_min_cents, &mut self.cheap_max_cents);

        self.target_profit_cents = clamp_dec(self.target_profit_cents, Decimal::ZERO, MAX_CENTS);

        let decay = &mut self.profit_decay;
        decay.per_min_cents = clamp_dec(decay.per_min_cents, Decimal::ZERO, MAX_CENTS);
        decay.start_cents = clamp_dec(decay.start_cents, Decimal::ZERO, MAX_CENTS);
        decay.end_cents = clamp_dec(decay.end_cents, Decimal::ZERO, MAX_CENTS);
        decay.start_sec = decay.start_sec.clamp(0, MAX_SEC);
        decay.end_sec = decay.end_sec.clamp(0, MAX_SEC);
        ordered(&mut decay.end_sec, &mut decay.start_sec);
        decay.step_cents = clamp_dec(decay.step_cents, dec!(0.01), MAX_CENTS);

        self.buffer_cents = self.buffer_cents.map(|v| clamp_dec(v, Decimal::ZERO, MAX_CENTS));
        self.max_spread_cents = self
            .max_spread_cents
            .map(|v| clamp_dec(v, Decimal::ZERO, MAX_CENTS));
        self.min_depth_pct = self.min_depth_pct.map(|v| clamp_dec(v, Decimal::ZERO, MAX_PCT));

        self.min_sec_to_hedge = self.min_sec_to_hedge.clamp(0, MAX_SEC);

        let stop = &mut self.stop_loss;
        stop.cut1_drop_cents = clamp_dec(stop.cut1_drop_cents, Decimal::ZERO, MAX_CENTS);
        stop.cut2_drop_cents = clamp_dec(stop.cut2_drop_cents, Decimal::ZERO, MAX_CENTS)
            .max(stop.cut1_drop_cents);
        stop.cut1_sell_pct = clamp_dec(stop.cut1_sell_pct, Decimal::ZERO, MAX_PCT);
        stop.cut2_sell_pct =
            clamp_dec(stop.cut2_sell_pct, Decimal::ZERO, MAX_PCT).max(stop.cut1_sell_pct);
        stop.min_sec_to_exit = stop.min_sec_to_exit.clamp(0, MAX_SEC);

        self.panic_hedge.start_sec = self.panic_hedge.start_sec.clamp(0, MAX_SEC);
        self.panic_hedge.max_loss_cents =
            clamp_dec(self.panic_hedge.max_loss_cents, Decimal::ZERO, MAX_CENTS);

        self.sim.initial_usdc = self.sim.initial_usdc.max(Decimal::ONE);
        self.max_depth_levels = self.max_depth_levels.clamp(1, 10_000);

        self
    }

    /// Mode tolerances with per-field overrides applied.
    pub fn tolerances(&self) -> RiskTolerances {
        let base = self.mode.tolerances();
        RiskTolerances {
            max_spread_cents: self.max_spread_cents.unwrap_or(base.max_spread_cents),
            min_depth_pct: self.min_depth_pct.unwrap_or(base.min_depth_pct),
            buffer_cents: self.buffer_cents.unwrap_or(base.buffer_cents),
        }
    }

    /// Apply `patch` and re-normalize.
    #[must_use]
    pub fn patched(mut self, patch: ConfigPatch) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = patch.$field { self.$field = v; })*
            };
        }
        take!(
            poll_ms,
            symbols,
            timeframes,
            amount_usd,
            entry_min_sec,
            entry_max_sec,
            cheap_min_cents,
            cheap_max_cents,
            target_profit_cents,
            profit_decay,
            mode,
            min_sec_to_hedge,
            hedge_ignore_spread,
            stop_loss,
            panic_hedge,
            sim,
            max_depth_levels,
        );
        // Overrides: `Some(None)` clears back to the mode default.
        if let Some(v) = patch.buffer_cents {
            self.buffer_cents = v;
        }
        if let Some(v) = patch.max_spread_cents {
            self.max_spread_cents = v;
        }
        if let Some(v) = patch.min_depth_pct {
            self.min_depth_pct = v;
        }
        self.normalized()
    }
}

/// Partial update. Nested sections are replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub poll_ms: Option<u64>,
    pub symbols: Option<Vec<String>>,
    pub timeframes: Option<Vec<Timeframe>>,
    pub amount_usd: Option<Decimal>,
    pub entry_min_sec: Option<i64>,
    pub entry_max_sec: Option<i64>,
    pub cheap_min_cents: Option<Decimal>,
    pub cheap_max_cents: Option<Decimal>,
    pub target_profit_cents: Option<Decimal>,
    pub profit_decay: Option<ProfitDecayConfig>,
    pub mode: Option<RiskMode>,
    pub buffer_cents: Option<Option<Decimal>>,
    pub max_spread_cents: Option<Option<Decimal>>,
    pub min_depth_pct: Option<Option<Decimal>>,
    pub min_sec_to_hedge: Option<i64>,
    pub hedge_ignore_spread: Option<bool>,
    pub stop_loss: Option<StopLossConfig>,
    pub panic_hedge: Option<PanicHedgeConfig>,
    pub sim: Option<SimConfig>,
    pub max_depth_levels: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HedgeConfig::default();
        assert_eq!(config.poll_ms, 2000);
        assert_eq!(config.symbols, vec!["BTC", "ETH", "SOL", "XRP"]);
        assert_eq!(config.timeframes, vec![Timeframe::M15]);
        assert_eq!(config.tolerances(), RiskMode::Balanced.tolerances());
        assert_eq!(config.clone().normalized(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HedgeConfig =
            serde_json::from_str(r#"{"amount_usd": "25", "mode": "aggressive"}"#).unwrap();
        assert_eq!(config.amount_usd, dec!(25));
        assert_eq!(config.entry_max_sec, 900);
        assert_eq!(config.tolerances().max_spread_cents, dec!(8));
    }

    #[test]
    fn test_normalized_clamps() {
        let mut config = HedgeConfig {
            poll_ms: 10,
            symbols: vec![" btc ".into(), "".into()],
            timeframes: vec![],
            amount_usd: dec!(-5),
            entry_min_sec: 900,
            entry_max_sec: 480,
            cheap_min_cents: dec!(0),
            cheap_max_cents: dec!(150),
            ..HedgeConfig::default()
        };
        config.profit_decay.step_cents = Decimal::ZERO;
        config.profit_decay.start_sec = 30;
        config.profit_decay.end_sec = 300;
        config.min_depth_pct = Some(dec!(250));
        config.sim.initial_usdc = Decimal::ZERO;
        config.max_depth_levels = 0;

        let config = config.normalized();
        assert_eq!(config.poll_ms, 250);
        assert_eq!(config.symbols, vec!["BTC"]);
        assert_eq!(config.timeframes, vec![Timeframe::M15]);
        assert_eq!(config.amount_usd, dec!(0.01));
        assert_eq!((config.entry_min_sec, config.entry_max_sec), (480, 900));
        assert_eq!((config.cheap_min_cents, config.cheap_max_cents), (dec!(1), dec!(99)));
        assert_eq!(config.profit_decay.step_cents, dec!(0.01));
        assert_eq!((config.profit_decay.end_sec, config.profit_decay.start_sec), (30, 300));
        assert_eq!(config.min_depth_pct, Some(dec!(100)));
        assert_eq!(config.sim.initial_usdc, dec!(1));
        assert_eq!(config.max_depth_levels, 1);
    }

    #[test]
    fn test_stop_loss_ladder_ordering() {
        let mut config = HedgeConfig::default();
        config.stop_loss.cut1_drop_cents = dec!(5);
        config.stop_loss.cut2_drop_cents = dec!(3);
        config.stop_loss.cut1_sell_pct = dec!(80);
        config.stop_loss.cut2_sell_pct = dec!(40);

        let stop = config.normalized().stop_loss;
        assert_eq!(stop.cut2_drop_cents, dec!(5));
        assert_eq!(stop.cut2_sell_pct, dec!(80));
    }

    #[test]
    fn test_patch_and_override_clear() {
        let config = HedgeConfig {
            max_spread_cents: Some(dec!(1)),
            ..HedgeConfig::default()
        };
        let patch: ConfigPatch = serde_json::from_str(
            r#"{"poll_ms": 1000, "mode": "conservative", "max_spread_cents": null}"#,
        )
        .unwrap();

        let patched = config.clone().patched(patch);
        assert_eq!(patched.poll_ms, 1000);
        assert_eq!(patched.mode, RiskMode::Conservative);
        // JSON null deserializes to `None` for the outer option: override kept.
        assert_eq!(patched.max_spread_cents, Some(dec!(1)));

        let clear = ConfigPatch {
            max_spread_cents: Some(None),
            ..ConfigPatch::default()
        };
        let cleared = config.patched(clear);
        assert_eq!(cleared.max_spread_cents, None);
        assert_eq!(cleared.tolerances().max_spread_cents, dec!(4));
    }
}
