//! Realized PnL replay.

use crate::error::LedgerError;
use crate::ledger::BookFilter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PnlRange {
    #[serde(rename = "1D")]
    Day,
    #[serde(rename = "1W")]
    Week,
    #[serde(rename = "1M")]
    Month,
    #[serde(rename = "ALL")]
    All,
}

impl PnlRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "1D",
            Self::Week => "1W",
            Self::Month => "1M",
            Self::All => "ALL",
        }
    }

    /// Window start for `now_ms`. `All` starts at the epoch.
    pub fn from_ms(&self, now_ms: u64) -> u64 {
        let span = match self {
            Self::Day => DAY_MS,
            Self::Week => 7 * DAY_MS,
            Self::Month => 30 * DAY_MS,
            Self::All => return 0,
        };
        now_ms.saturating_sub(span)
    }
}

impl fmt::Display for PnlRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PnlRange {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "1D" => Ok(Self::Day),
            "1W" => Ok(Self::Week),
            "1M" => Ok(Self::Month),
            "ALL" => Ok(Self::All),
            _ => Err(LedgerError::UnknownRange(s.to_string())),
        }
    }
}

/// Cumulative realized PnL at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlPoint {
    pub timestamp_ms: u64,
    pub cumulative_usd: Decimal,
}

/// Realized PnL over a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlReport {
    pub range: PnlRange,
    pub book: BookFilter,
    pub from_ms: u64,
    pub realized_pnl_usd: Decimal,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub series: Vec<PnlPoint>,
}

/// One realized result, as kept by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Realized {
    pub timestamp_ms: u64,
    pub simulated: bool,
    pub pnl_usd: Decimal,
}

/// Replay `realized` (oldest first) into a report.
pub(crate) fn replay(
    realized: &[Realized],
    range: PnlRange,
    book: BookFilter,
    now_ms: u64,
) -> PnlReport {
    let from_ms = range.from_ms(now_ms);
    let mut report = PnlReport {
        range,
        book,
        from_ms,
        realized_pnl_usd: Decimal::ZERO,
        trades: 0,
        wins: 0,
        losses: 0,
        series: Vec::new(),
    };

    for r in realized
        .iter()
        .filter(|r| r.timestamp_ms >= from_ms && book.matches(r.simulated))
    {
        report.realized_pnl_usd += r.pnl_usd;
        report.trades += 1;
        if r.pnl_usd > Decimal::ZERO {
            report.wins += 1;
        } else if r.pnl_usd < Decimal::ZERO {
            report.losses += 1;
        }
        report.series.push(PnlPoint {
            timestamp_ms: r.timestamp_ms,
            cumulative_usd: report.realized_pnl_usd,
        });
    }

    report
}
