//! In-memory history with optional JSON Lines persistence.

use crate::event::HistoryEvent;
use crate::pnl::{replay, PnlRange, PnlReport, Realized};
use crate::writer::HistoryWriter;
use hedge_core::ConditionId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// Default number of events kept in memory.
pub const DEFAULT_MAX_ENTRIES: usize = 2000;

/// Which events a history query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryView {
    #[default]
    All,
    /// Skipped attempts only.
    Attempts,
    /// Events that placed or settled an order.
    Orders,
}

/// Real book, simulated book, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookFilter {
    Real,
    Sim,
    #[default]
    Any,
}

impl BookFilter {
    pub fn matches(&self, simulated: bool) -> bool {
        match self {
            Self::Real => !simulated,
            Self::Sim => simulated,
            Self::Any => true,
        }
    }
}

/// History query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub view: HistoryView,
    #[serde(default)]
    pub book: BookFilter,
    #[serde(default)]
    pub condition_id: Option<ConditionId>,
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl HistoryFilter {
    fn matches(&self, event: &HistoryEvent) -> bool {
        let view = match self.view {
            HistoryView::All => true,
            HistoryView::Attempts => !event.status.is_order(),
            HistoryView::Orders => event.status.is_order(),
        };
        view && self.book.matches(event.simulated)
            && self
                .condition_id
                .as_ref()
                .map_or(true, |cid| *cid == event.condition_id)
    }
}

struct LedgerInner {
    events: VecDeque<HistoryEvent>,
    realized: Vec<Realized>,
    writer: Option<HistoryWriter>,
}

/// Append-only trade history.
///
/// Keeps the newest `max_entries` events for queries. Realized results are
/// kept separately so PnL replay is not affected by the history bound.
pub struct Ledger {
    inner: Mutex<LedgerInner>,
    max_entries: usize,
}

impl Ledger {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                events: VecDeque::new(),
                realized: Vec::new(),
                writer: None,
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Persist every appended event through `writer`.
    pub fn with_writer(self, writer: HistoryWriter) -> Self {
        self.inner.lock().writer = Some(writer);
        self
    }

    /// Seed from previously persisted events (oldest first). Not re-written.
    pub fn restore(&self, events: Vec<HistoryEvent>) {
        let mut inner = self.inner.lock();
        for event in events {
            push(&mut inner, event, self.max_entries);
        }
    }

    pub fn append(&self, event: HistoryEvent) {
        let mut inner = self.inner.lock();
        if let Some(writer) = inner.writer.as_mut() {
            if let Err(e) = writer.add_record(event.clone()) {
                warn!(error = %e, event_id = %event.id, "Failed to persist history event");
            }
        }
        push(&mut inner, event, self.max_entries);
    }

    /// Matching events, newest first.
    pub fn get_history(&self, filter: &HistoryFilter) -> Vec<HistoryEvent> {
        let inner = self.inner.lock();
        let limit = filter.max_entries.unwrap_or(self.max_entries);
        inner
            .events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Realized PnL for `book` within `range` ending at `now_ms`.
    pub fn pnl(&self, range: PnlRange, book: BookFilter, now_ms: u64) -> PnlReport {
        let inner = self.inner.lock();
        replay(&inner.realized, range, book, now_ms)
    }

    /// Drop all in-memory events and realized results.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.events.clear();
        inner.realized.clear();
    }

    /// Flush the history writer, if any.
    pub fn flush(&self) {
        if let Some(writer) = self.inner.lock().writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "Failed to flush history writer");
            }
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

fn push(inner: &mut LedgerInner, event: HistoryEvent, max_entries: usize) {
    if let Some(pnl_usd) = event.realized_pnl_usd {
        let realized = Realized {
            timestamp_ms: event.timestamp_ms,
            simulated: event.simulated,
            pnl_usd,
        };
        // Keep replay order by time even when appends arrive out of order.
        let at = inner
            .realized
            .partition_point(|r| r.timestamp_ms <= realized.timestamp_ms);
        inner.realized.insert(at, realized);
    }
    inner.events.push_back(event);
    while inner.events.len() > max_entries {
        inner.events.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HistoryAction, HistoryStatus};
    use crate::writer::load_history;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn event(ts: u64, status: HistoryStatus, cid: &str, simulated: bool) -> HistoryEvent {
        HistoryEvent::new(
            ts,
            HistoryAction::Entry,
            status,
            "BTC",
            ConditionId::from(cid),
            simulated,
        )
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let ledger = Ledger::new(3);
        for ts in 1..=5 {
            ledger.append(event(ts, HistoryStatus::Filled, "0xa", false));
        }

        let history = ledger.get_history(&HistoryFilter::default());
        let stamps: Vec<u64> = history.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![5, 4, 3]);
    }

    #[test]
    fn test_filters() {
        let ledger = Ledger::default();
        ledger.append(event(1, HistoryStatus::Skipped, "0xa", false));
        ledger.append(event(2, HistoryStatus::Filled, "0xa", false));
        ledger.append(event(3, HistoryStatus::Failed, "0xb", true));
        ledger.append(event(4, HistoryStatus::TimedOut, "0xb", false));

        let attempts = ledger.get_history(&HistoryFilter {
            view: HistoryView::Attempts,
            ..Default::default()
        });
        assert_eq!(attempts.len(), 1);

        let orders = ledger.get_history(&HistoryFilter {
            view: HistoryView::Orders,
            ..Default::default()
        });
        assert_eq!(orders.len(), 3);

        let sim = ledger.get_history(&HistoryFilter {
            book: BookFilter::Sim,
            ..Default::default()
        });
        assert_eq!(sim.len(), 1);

        let market_b = ledger.get_history(&HistoryFilter {
            condition_id: Some(ConditionId::from("0xb")),
            max_entries: Some(1),
            ..Default::default()
        });
        assert_eq!(market_b.len(), 1);
        assert_eq!(market_b[0].timestamp_ms, 4);
    }

    #[test]
    fn test_pnl_survives_history_bound() {
        let ledger = Ledger::new(1);
        ledger.append(
            event(10, HistoryStatus::Settled, "0xa", false).with_realized_pnl(dec!(2.5)),
        );
        ledger.append(event(11, HistoryStatus::Skipped, "0xa", false));

        let report = ledger.pnl(PnlRange::All, BookFilter::Real, 100);
        assert_eq!(report.realized_pnl_usd, dec!(2.5));
        assert_eq!(report.trades, 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_writer_persists_appends() {
        let temp_dir = TempDir::new().unwrap();
        let writer = HistoryWriter::new(temp_dir.path(), 1).unwrap();
        let ledger = Ledger::default().with_writer(writer);

        ledger.append(event(1_700_000_000_000, HistoryStatus::Filled, "0xa", false));
        ledger.append(event(1_700_000_000_001, HistoryStatus::Skipped, "0xa", false));
        ledger.flush();

        let restored = Ledger::default();
        restored.restore(load_history(temp_dir.path()).unwrap());
        assert_eq!(restored.len(), 2);
    }
}
