//! Trading client trait.
//!
//! Order placement is an external collaborator. Implementations must surface
//! every failure as an `Err`; an `OrderAck` with `success = false` is treated
//! as a rejection by the executor.

use crate::error::{ExecutorError, ExecutorResult};
use hedge_core::{BoxFuture, MarketOrderArgs, OrderAck};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Places market orders.
pub trait TradingClient: Send + Sync {
    /// Submit a market order and wait for the acknowledgement.
    fn create_market_order(&self, args: MarketOrderArgs) -> BoxFuture<'_, ExecutorResult<OrderAck>>;

    /// Short label for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Arc wrapper for TradingClient trait objects.
pub type DynTradingClient = Arc<dyn TradingClient>;

/// Mock trading client for testing.
#[derive(Debug)]
pub struct MockTradingClient {
    /// Recorded orders for verification.
    orders: Mutex<Vec<MarketOrderArgs>>,
    /// Result to return; `None` acknowledges a fill at the reference price.
    next_result: Mutex<Option<ExecutorResult<OrderAck>>>,
    latency: Mutex<Duration>,
    calls: AtomicUsize,
}

impl Default for MockTradingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTradingClient {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            next_result: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock that takes `latency` to answer every order.
    pub fn with_latency(latency: Duration) -> Self {
        let client = Self::new();
        client.set_latency(latency);
        client
    }

    /// Set the result returned by every subsequent call.
    pub fn set_result(&self, result: Option<ExecutorResult<OrderAck>>) {
        *self.next_result.lock() = result;
    }

    pub fn set_failure(&self, error: ExecutorError) {
        self.set_result(Some(Err(error)));
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of `create_market_order` invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Recorded orders.
    pub fn orders(&self) -> Vec<MarketOrderArgs> {
        self.orders.lock().clone()
    }
}

impl TradingClient for MockTradingClient {
    fn create_market_order(&self, args: MarketOrderArgs) -> BoxFuture<'_, ExecutorResult<OrderAck>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.orders.lock().push(args);
            let latency = *self.latency.lock();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let configured = self.next_result.lock().clone();
            configured.unwrap_or_else(|| {
                Ok(OrderAck {
                    success: true,
                    order_id: Some(format!("o_{n}")),
                    filled_size: None,
                    avg_price: None,
                })
            })
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
