//! Locked order execution.
//!
//! `LockedExecutor` pairs the [`ExecutionLock`] with a bounded wait on the
//! trading client. The order call runs in its own task: if it outlives the
//! hold timeout the key is released and the attempt is reported as
//! `TimedOut`, while the call itself still runs to completion. Its late
//! result is logged and handed to whoever asked for it through
//! [`LockedExecutor::submit_tracked`].

use crate::client::DynTradingClient;
use crate::error::ExecutorResult;
use crate::lock::{Busy, ExecutionLock, LockKey, LockTicket};
use hedge_core::{MarketOrderArgs, OrderAck, Price, Size};
use hedge_telemetry::Metrics;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Default lock hold timeout.
pub const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(20);

/// Confirmed fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub ack: OrderAck,
    pub shares: Size,
    pub price: Price,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.shares.notional(self.price)
    }
}

/// Outcome of one locked execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Order acknowledged as filled.
    Filled(Fill),
    /// Trading client returned an error or a non-success ack.
    Failed { error: String },
    /// Another attempt holds the key.
    Busy,
    /// Hold timeout elapsed; the key was force-released.
    TimedOut { after_ms: u64 },
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }

    /// Short label for history and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Filled(_) => "filled",
            Self::Failed { .. } => "failed",
            Self::Busy => "in-flight",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

/// Executes orders under the per-key lock.
#[derive(Clone)]
pub struct LockedExecutor {
    lock: ExecutionLock,
    order_timeout: Duration,
}

impl LockedExecutor {
    #[must_use]
    pub fn new(lock: ExecutionLock, order_timeout: Duration) -> Self {
        Self {
            lock,
            order_timeout,
        }
    }

    pub fn lock(&self) -> &ExecutionLock {
        &self.lock
    }

    pub fn order_timeout(&self) -> Duration {
        self.order_timeout
    }

    /// Take the key for a later [`LockedExecutor::submit`]. Callers use the
    /// gap to re-validate state that may have changed while they waited.
    pub fn try_acquire(&self, key: LockKey) -> Result<LockTicket, Busy> {
        self.lock.try_acquire(key)
    }

    /// Acquire `key` and submit.
    pub async fn execute(
        &self,
        key: LockKey,
        client: DynTradingClient,
        args: MarketOrderArgs,
    ) -> ExecutionOutcome {
        match self.try_acquire(key) {
            Ok(ticket) => self.submit(ticket, client, args).await,
            Err(busy) => {
                debug!(key = %busy.key, "Execution skipped, key in flight");
                ExecutionOutcome::Busy
            }
        }
    }

    /// Submit an order while holding `ticket`. The ticket is released when
    /// this returns, whatever the outcome.
    pub async fn submit(
        &self,
        ticket: LockTicket,
        client: DynTradingClient,
        args: MarketOrderArgs,
    ) -> ExecutionOutcome {
        self.submit_tracked(ticket, client, args).await.outcome
    }

    /// Like [`LockedExecutor::submit`], but a call that outlives the hold
    /// timeout hands its eventual result to [`Submission::late`].
    pub async fn submit_tracked(
        &self,
        ticket: LockTicket,
        client: DynTradingClient,
        args: MarketOrderArgs,
    ) -> Submission {
        let key = ticket.key().clone();
        let client_name = client.name();
        let call_args = args.clone();
        let mut handle =
            tokio::spawn(async move { client.create_market_order(call_args).await });

        let mut late = None;
        let outcome = match tokio::time::timeout(self.order_timeout, &mut handle).await {
            Ok(Ok(result)) => match read_ack(result, &args) {
                Ok(fill) => {
                    info!(
                        key = %key,
                        client = client_name,
                        shares = %fill.shares,
                        price = %fill.price,
                        order_id = ?fill.ack.order_id,
                        "Order filled"
                    );
                    ExecutionOutcome::Filled(fill)
                }
                Err(error) => ExecutionOutcome::Failed { error },
            },
            Ok(Err(join_err)) => ExecutionOutcome::Failed {
                error: format!("order task failed: {join_err}"),
            },
            Err(_) => {
                let after_ms = millis(self.order_timeout);
                Metrics::lock_timeout(key.leg.as_str());
                warn!(key = %key, after_ms, "Order call exceeded hold timeout, releasing lock");
                let (tx, rx) = oneshot::channel();
                late = Some(rx);
                let late_key = key.clone();
                tokio::spawn(async move {
                    let result = match handle.await {
                        Ok(result) => read_ack(result, &args),
                        Err(e) => Err(format!("order task failed: {e}")),
                    };
                    let ack = match result {
                        Ok(fill) => {
                            warn!(
                                key = %late_key,
                                shares = %fill.shares,
                                order_id = ?fill.ack.order_id,
                                "Late fill after timeout"
                            );
                            LateAck::Filled(fill)
                        }
                        Err(error) => {
                            warn!(key = %late_key, error = %error, "Late order failure after timeout");
                            LateAck::Failed { error }
                        }
                    };
                    // Nobody listening is fine; the log above stands.
                    let _ = tx.send(ack);
                });
                ExecutionOutcome::TimedOut { after_ms }
            }
        };

        if let ExecutionOutcome::Failed { error } = &outcome {
            warn!(key = %key, client = client_name, error = %error, "Order failed");
        }
        drop(ticket);
        Submission { outcome, late }
    }
}

/// Outcome plus, for a timed-out call, the channel its late result lands on.
#[derive(Debug)]
pub struct Submission {
    pub outcome: ExecutionOutcome,
    pub late: Option<oneshot::Receiver<LateAck>>,
}

/// Result of an order call that finished after its hold timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LateAck {
    Filled(Fill),
    Failed { error: String },
}

fn read_ack(result: ExecutorResult<OrderAck>, args: &MarketOrderArgs) -> Result<Fill, String> {
    match result {
        Ok(ack) if ack.success => Ok(Fill {
            shares: ack.filled_shares(args),
            price: ack.fill_price(args),
            ack,
        }),
        Ok(_) => Err("order not filled".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
