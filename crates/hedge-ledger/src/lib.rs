//! Trade history and PnL for the hedge engine.
//!
//! Every attempted or realized transition is appended as a [`HistoryEvent`].
//! The [`Ledger`] keeps a bounded in-memory view for queries, replays realized
//! results into [`PnlReport`]s, and optionally persists events as daily JSON
//! Lines files through [`HistoryWriter`].

pub mod error;
pub mod event;
pub mod ledger;
pub mod pnl;
pub mod writer;

pub use error::{LedgerError, LedgerResult};
pub use event::{HistoryAction, HistoryEvent, HistoryStatus};
pub use ledger::{BookFilter, HistoryFilter, HistoryView, Ledger, DEFAULT_MAX_ENTRIES};
pub use pnl::{PnlPoint, PnlRange, PnlReport};
pub use writer::{load_history, HistoryWriter};
