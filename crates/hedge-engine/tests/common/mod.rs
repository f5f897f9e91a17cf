//! Shared harness for engine integration tests.

#![allow(dead_code)]

use hedge_core::{
    BookLevel, BookSnapshot, ConditionId, ManualClock, MarketInfo, MarketSnapshot, OutcomeToken,
    Price, Size, Timeframe, TokenId,
};
use hedge_engine::{HedgeConfig, HedgeEngine, HedgeService};
use hedge_executor::MockTradingClient;
use hedge_feed::{CacheConfig, DataCache, MockMarketProvider, MockOrderbookProvider};
use hedge_ledger::Ledger;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

pub const START_MS: u64 = 1_700_000_000_000;
pub const CID: &str = "0xbtc15m";

pub struct Harness {
    pub service: HedgeService,
    pub engine: Arc<HedgeEngine>,
    pub clock: Arc<ManualClock>,
    pub markets: Arc<MockMarketProvider>,
    pub books: Arc<MockOrderbookProvider>,
    pub client: Arc<MockTradingClient>,
}

pub fn harness(config: HedgeConfig, client: MockTradingClient, order_timeout: Duration) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let markets = Arc::new(MockMarketProvider::new());
    let books = Arc::new(MockOrderbookProvider::new());
    let client = Arc::new(client);
    let cache_config = CacheConfig {
        min_refresh_ms: 0,
        ..CacheConfig::default()
    };
    let data = Arc::new(DataCache::new(
        cache_config,
        config.symbols.clone(),
        markets.clone(),
        books.clone(),
        clock.clone(),
    ));
    let engine = Arc::new(HedgeEngine::new(
        config,
        data,
        client.clone(),
        Arc::new(Ledger::default()),
        clock.clone(),
        order_timeout,
    ));
    Harness {
        service: HedgeService::new(Arc::clone(&engine)),
        engine,
        clock,
        markets,
        books,
        client,
    }
}

pub fn cid() -> ConditionId {
    ConditionId::from(CID)
}

fn tokens() -> [OutcomeToken; 2] {
    [OutcomeToken::new("Up", "btc-up"), OutcomeToken::new("Down", "btc-down")]
}

pub fn market(secs_left: u64) -> MarketSnapshot {
    MarketSnapshot::new(
        cid(),
        "BTC",
        Timeframe::M15,
        tokens(),
        START_MS + secs_left * 1000,
        START_MS,
    )
}

pub fn market_info(secs_left: u64) -> MarketInfo {
    MarketInfo {
        condition_id: cid(),
        tokens: tokens().to_vec(),
        end_time_ms: START_MS + secs_left * 1000,
        symbol: Some("BTC".to_string()),
        timeframe: Some(Timeframe::M15),
    }
}

pub fn book(token: &str, bid: Decimal, ask: Decimal) -> BookSnapshot {
    BookSnapshot::new(
        TokenId::from(token),
        vec![BookLevel::new(Price::new(bid), Size::new(dec!(1000)))],
        vec![BookLevel::new(Price::new(ask), Size::new(dec!(1000)))],
    )
}
