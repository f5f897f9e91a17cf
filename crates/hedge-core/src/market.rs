//! Market identification types.
//!
//! Every up/down market is a binary condition with exactly two outcome
//! tokens ("Up" and "Down"). Markets belong to a recurring series keyed
//! by symbol and timeframe and settle at a fixed end time.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique condition identifier of a binary market (hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionId(pub String);

impl ConditionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConditionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Tradable outcome token identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Settlement cadence of a recurring up/down series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [Self::M5, Self::M15, Self::H1, Self::H4, Self::D1];

    /// Window length in seconds.
    pub fn duration_secs(&self) -> u64 {
        match self {
            Self::M5 => 300,
            Self::M15 => 900,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            other => Err(CoreError::UnknownTimeframe(other.to_string())),
        }
    }
}

/// One tradable side of a binary market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeToken {
    pub outcome: String,
    pub token_id: TokenId,
}

impl OutcomeToken {
    pub fn new(outcome: impl Into<String>, token_id: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            token_id: TokenId::new(token_id),
        }
    }
}

/// Market metadata as returned by a single-market lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub condition_id: ConditionId,
    pub tokens: Vec<OutcomeToken>,
    pub end_time_ms: u64,
    pub symbol: Option<String>,
    pub timeframe: Option<Timeframe>,
}

impl MarketInfo {
    /// Promote to a snapshot. Fails unless exactly two outcome tokens exist.
    pub fn into_snapshot(self, now_ms: u64) -> Result<MarketSnapshot> {
        let [first, second]: [OutcomeToken; 2] = self.tokens.try_into().map_err(|t: Vec<_>| {
            CoreError::InvalidMarket(format!(
                "{}: expected 2 outcome tokens, got {}",
                self.condition_id,
                t.len()
            ))
        })?;
        Ok(MarketSnapshot::new(
            self.condition_id,
            self.symbol.unwrap_or_else(|| "?".to_string()),
            self.timeframe.unwrap_or(Timeframe::M15),
            [first, second],
            self.end_time_ms,
            now_ms,
        ))
    }
}

/// Captured state of one binary market.
///
/// `seconds_to_expire` is the value at capture time. Decision code should
/// call [`MarketSnapshot::seconds_to_expire_at`] with the current clock so a
/// stale snapshot never over-reports the remaining window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub condition_id: ConditionId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub outcome_tokens: [OutcomeToken; 2],
    pub end_time_ms: u64,
    pub seconds_to_expire: i64,
}

impl MarketSnapshot {
    #[must_use]
    pub fn new(
        condition_id: ConditionId,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        outcome_tokens: [OutcomeToken; 2],
        end_time_ms: u64,
        now_ms: u64,
    ) -> Self {
        let mut snapshot = Self {
            condition_id,
            symbol: symbol.into(),
            timeframe,
            outcome_tokens,
            end_time_ms,
            seconds_to_expire: 0,
        };
        snapshot.seconds_to_expire = snapshot.seconds_to_expire_at(now_ms);
        snapshot
    }

    /// Whole seconds until settlement; negative once expired.
    pub fn seconds_to_expire_at(&self, now_ms: u64) -> i64 {
        (self.end_time_ms as i64 - now_ms as i64).div_euclid(1000)
    }

    pub fn token(&self, index: usize) -> Option<&OutcomeToken> {
        self.outcome_tokens.get(index)
    }

    /// Index of the opposite outcome.
    pub fn opposite(index: usize) -> usize {
        1 - (index & 1)
    }

    pub fn token_ids(&self) -> [TokenId; 2] {
        [
            self.outcome_tokens[0].token_id.clone(),
            self.outcome_tokens[1].token_id.clone(),
        ]
    }
}
