//! Order execution for the hedge engine.
//!
//! # Key Components
//!
//! - [`ExecutionLock`]: per `(condition_id, leg)` in-flight guard, released on drop
//! - [`LockedExecutor`]: submits under the lock with a bounded hold time
//! - [`TradingClient`]: order placement seam
//! - [`SimulatedTradingClient`]: fills against a virtual [`SimLedger`]
//! - [`GatewayTradingClient`]: HTTP order gateway
//!
//! # Execution outcomes
//!
//! 1. key held elsewhere -> `Busy` (no client call)
//! 2. client error or unsuccessful ack -> `Failed`
//! 3. hold timeout elapsed -> `TimedOut`, key force-released, late result
//!    delivered on [`Submission::late`]
//! 4. otherwise -> `Filled`

pub mod client;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod lock;
pub mod sim;

pub use client::{DynTradingClient, MockTradingClient, TradingClient};
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{
    ExecutionOutcome, Fill, LateAck, LockedExecutor, Submission, DEFAULT_ORDER_TIMEOUT,
};
pub use gateway::{parse_ack, GatewayTradingClient};
pub use lock::{Busy, ExecutionLock, HeldLock, LockKey, LockTicket};
pub use sim::{SharedSimLedger, SimLedger, SimulatedTradingClient};
