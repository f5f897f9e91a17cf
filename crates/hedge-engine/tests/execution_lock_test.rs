//! Execution lock integration tests.
//!
//! Concurrent entries on one market and lock hold timeouts, driven through
//! the service with mock upstreams.

mod common;
use common::{book, cid, harness, market_info};

use hedge_engine::{HedgeConfig, ManualEntry, Phase};
use hedge_executor::MockTradingClient;
use hedge_ledger::{HistoryAction, HistoryFilter, HistoryStatus};
use rust_decimal_macros::dec;
use std::time::Duration;

fn entry() -> ManualEntry {
    ManualEntry {
        condition_id: cid(),
        outcome_index: 0,
        amount_usd: Some(dec!(5)),
    }
}

fn seed(h: &common::Harness) {
    h.markets.insert_info(market_info(600));
    h.books.set_book(book("btc-up", dec!(0.40), dec!(0.42)));
    h.books.set_book(book("btc-down", dec!(0.57), dec!(0.59)));
}

/// Two manual entries racing on one market: one order, one in-flight skip.
#[tokio::test]
async fn test_concurrent_manual_entries_place_one_order() {
    let h = harness(
        HedgeConfig::default(),
        MockTradingClient::with_latency(Duration::from_millis(50)),
        Duration::from_secs(5),
    );
    seed(&h);

    let (a, b) = tokio::join!(
        h.service.place_entry(entry()),
        h.service.place_entry(entry())
    );
    let mut statuses = vec![a.unwrap(), b.unwrap()];
    statuses.sort_by_key(|e| e.status.as_str());

    assert_eq!(h.client.calls(), 1);
    assert_eq!(statuses[0].status, HistoryStatus::Filled);
    assert_eq!(statuses[1].status, HistoryStatus::Skipped);
    assert_eq!(statuses[1].reason.as_deref(), Some("in-flight"));

    assert_eq!(h.engine.positions().len(), 1);
    assert_eq!(h.engine.phase(&cid()), Some(Phase::Entered));
    assert!(h.engine.held_locks().is_empty());
}

/// An entry on an already-entered market is rejected after the lock.
#[tokio::test]
async fn test_second_entry_after_fill_is_skipped() {
    let h = harness(
        HedgeConfig::default(),
        MockTradingClient::new(),
        Duration::from_secs(5),
    );
    seed(&h);

    let first = h.service.place_entry(entry()).await.unwrap();
    let second = h.service.place_entry(entry()).await.unwrap();

    assert_eq!(first.status, HistoryStatus::Filled);
    assert_eq!(second.status, HistoryStatus::Skipped);
    assert_eq!(second.reason.as_deref(), Some("already-entered"));
    assert_eq!(h.client.calls(), 1);
}

/// A slow order is abandoned at the hold timeout and the key is free again.
#[tokio::test]
async fn test_lock_timeout_releases_key() {
    let h = harness(
        HedgeConfig::default(),
        MockTradingClient::with_latency(Duration::from_millis(500)),
        Duration::from_millis(30),
    );
    seed(&h);

    let timed_out = h.service.place_entry(entry()).await.unwrap();
    assert_eq!(timed_out.action, HistoryAction::Entry);
    assert_eq!(timed_out.status, HistoryStatus::TimedOut);
    assert!(!timed_out.success);
    assert!(timed_out.error_msg.as_deref().unwrap().contains("30ms"));
    assert!(h.engine.held_locks().is_empty());
    assert_eq!(h.engine.phase(&cid()), Some(Phase::Watching));

    h.client.set_latency(Duration::ZERO);
    let retried = h.service.place_entry(entry()).await.unwrap();
    assert_eq!(retried.status, HistoryStatus::Filled);
    assert_eq!(h.client.calls(), 2);
}

/// An order that answers after its timeout leaves a follow-up record.
#[tokio::test]
async fn test_late_fill_recorded_after_timeout() {
    let h = harness(
        HedgeConfig::default(),
        MockTradingClient::with_latency(Duration::from_millis(150)),
        Duration::from_millis(30),
    );
    seed(&h);

    let timed_out = h.service.place_entry(entry()).await.unwrap();
    assert_eq!(timed_out.status, HistoryStatus::TimedOut);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let history = h.service.get_history(&HistoryFilter::default());
    let late = history
        .iter()
        .find(|e| e.reason.as_deref() == Some("late-ack"))
        .expect("late fill recorded");
    assert_eq!(late.action, HistoryAction::Entry);
    assert_eq!(late.status, HistoryStatus::Filled);
    assert!(late.success);
    assert_eq!(late.order_id.as_deref(), Some("o_1"));
    assert!(late.filled_size.is_some());
    assert_ne!(late.id, timed_out.id);

    // Audit only: the market is still waiting for an entry.
    assert_eq!(h.engine.phase(&cid()), Some(Phase::Watching));
    assert!(h.engine.position(&cid()).is_none());
}

#[tokio::test]
async fn test_manual_entry_rejects_bad_outcome_and_missing_book() {
    let h = harness(
        HedgeConfig::default(),
        MockTradingClient::new(),
        Duration::from_secs(5),
    );
    h.markets.insert_info(market_info(600));

    let bad = h
        .service
        .place_entry(ManualEntry {
            outcome_index: 2,
            ..entry()
        })
        .await;
    assert!(matches!(bad, Err(hedge_engine::EngineError::InvalidOutcome(2))));

    let no_book = h.service.place_entry(entry()).await;
    assert!(matches!(no_book, Err(hedge_engine::EngineError::NoLiquidity(_))));
    assert_eq!(h.client.calls(), 0);
}
