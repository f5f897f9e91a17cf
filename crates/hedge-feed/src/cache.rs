//! Single-flight snapshot cache with rate limiting and exponential backoff.
//!
//! Each key owns one slot. A read either:
//! - joins the fetch already in flight for the key,
//! - returns the stored snapshot when the slot is gated (`now < next_allowed_at_ms`), or
//! - starts a new upstream fetch.
//!
//! Fetches run in a spawned task so the slot is always completed, even if
//! every caller is dropped. The in-flight handle is installed and removed
//! under the slot table mutex, which is never held across an `.await`.

use crate::error::{FeedError, FeedResult};
use futures_util::future::{FutureExt, Shared};
use hedge_core::DynClock;
use hedge_telemetry::Metrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::provider::BoxFuture;

type SharedFetch<T> = Shared<BoxFuture<'static, FeedResult<T>>>;

// ============================================================================
// Config
// ============================================================================

/// Cache timing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Minimum spacing between successful fetches of one slot.
    #[serde(default = "default_min_refresh_ms")]
    pub min_refresh_ms: u64,
    /// Backoff after the first failure.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Backoff ceiling.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive failures.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u64,
    /// Upper bound on a single upstream fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_min_refresh_ms() -> u64 {
    1_000
}

fn default_base_backoff_ms() -> u64 {
    2_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_backoff_factor() -> u64 {
    2
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_refresh_ms: default_min_refresh_ms(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_factor: default_backoff_factor(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl CacheConfig {
    /// Clamp into a consistent configuration (ceiling >= base >= 1, factor >= 1).
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.base_backoff_ms = self.base_backoff_ms.max(1);
        self.max_backoff_ms = self.max_backoff_ms.max(self.base_backoff_ms);
        self.backoff_factor = self.backoff_factor.max(1);
        self.fetch_timeout_ms = self.fetch_timeout_ms.max(1);
        self
    }
}

// ============================================================================
// Slot
// ============================================================================

struct CacheSlot<T> {
    snapshot: Option<T>,
    fetched_at_ms: Option<u64>,
    last_error: Option<String>,
    last_attempt_at_ms: Option<u64>,
    last_attempt_error: Option<String>,
    backoff_ms: u64,
    consecutive_failures: u32,
    next_allowed_at_ms: u64,
    in_flight: Option<SharedFetch<T>>,
}

impl<T: Clone> CacheSlot<T> {
    fn new(base_backoff_ms: u64) -> Self {
        Self {
            snapshot: None,
            fetched_at_ms: None,
            last_error: None,
            last_attempt_at_ms: None,
            last_attempt_error: None,
            backoff_ms: base_backoff_ms,
            consecutive_failures: 0,
            next_allowed_at_ms: 0,
            in_flight: None,
        }
    }

    fn read(&self) -> CacheRead<T> {
        CacheRead {
            snapshot: self.snapshot.clone(),
            fetched_at_ms: self.fetched_at_ms,
            stale: self.last_attempt_error.is_some(),
            last_error: self.last_error.clone(),
        }
    }

    fn status(&self) -> SlotStatus {
        SlotStatus {
            has_snapshot: self.snapshot.is_some(),
            fetched_at_ms: self.fetched_at_ms,
            last_error: self.last_error.clone(),
            last_attempt_at_ms: self.last_attempt_at_ms,
            last_attempt_error: self.last_attempt_error.clone(),
            backoff_ms: self.backoff_ms,
            consecutive_failures: self.consecutive_failures,
            next_allowed_at_ms: self.next_allowed_at_ms,
            in_flight: self.in_flight.is_some(),
        }
    }
}

/// Result of a cache read.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// Last good snapshot, if any fetch ever succeeded.
    pub snapshot: Option<T>,
    pub fetched_at_ms: Option<u64>,
    /// The most recent attempt failed; `snapshot` predates it.
    pub stale: bool,
    pub last_error: Option<String>,
}

impl<T> CacheRead<T> {
    fn empty() -> Self {
        Self {
            snapshot: None,
            fetched_at_ms: None,
            stale: true,
            last_error: None,
        }
    }
}

/// Diagnostic view of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub has_snapshot: bool,
    pub fetched_at_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_attempt_at_ms: Option<u64>,
    pub last_attempt_error: Option<String>,
    pub backoff_ms: u64,
    pub consecutive_failures: u32,
    pub next_allowed_at_ms: u64,
    pub in_flight: bool,
}

// ============================================================================
// Cache
// ============================================================================

struct Inner<K, T> {
    name: &'static str,
    config: CacheConfig,
    clock: DynClock,
    slots: Mutex<HashMap<K, CacheSlot<T>>>,
}

impl<K, T> Inner<K, T>
where
    K: Eq + Hash + Clone + fmt::Display,
    T: Clone,
{
    /// Record a finished fetch and clear the in-flight handle.
    fn complete(&self, key: &K, result: &FeedResult<T>) {
        let now = self.clock.now_ms();
        let mut slots = self.slots.lock();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| CacheSlot::new(self.config.base_backoff_ms));
        slot.in_flight = None;

        match result {
            Ok(snapshot) => {
                slot.snapshot = Some(snapshot.clone());
                slot.fetched_at_ms = Some(now);
                slot.last_error = None;
                slot.last_attempt_error = None;
                slot.consecutive_failures = 0;
                slot.backoff_ms = self.config.base_backoff_ms;
                slot.next_allowed_at_ms = now + self.config.min_refresh_ms;
                Metrics::cache_fetch(self.name, true);
            }
            Err(e) => {
                slot.consecutive_failures += 1;
                slot.backoff_ms = if slot.consecutive_failures == 1 {
                    self.config.base_backoff_ms
                } else {
                    slot.backoff_ms
                        .saturating_mul(self.config.backoff_factor)
                        .min(self.config.max_backoff_ms)
                };
                slot.next_allowed_at_ms = now + slot.backoff_ms;
                slot.last_error = Some(e.to_string());
                slot.last_attempt_error = Some(e.to_string());
                Metrics::cache_fetch(self.name, false);
                warn!(
                    cache = self.name,
                    scope = %key,
                    error = %e,
                    backoff_ms = slot.backoff_ms,
                    failures = slot.consecutive_failures,
                    "Fetch failed, backing off"
                );
            }
        }
        Metrics::cache_backoff(self.name, &key.to_string(), slot.backoff_ms);
    }
}

/// Keyed single-flight cache.
pub struct SnapshotCache<K, T> {
    inner: Arc<Inner<K, T>>,
}

impl<K, T> Clone for SnapshotCache<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> SnapshotCache<K, T>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. `name` labels logs and metrics.
    #[must_use]
    pub fn new(name: &'static str, config: CacheConfig, clock: DynClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                config: config.normalized(),
                clock,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Read `key`, fetching with `fetch` only when no fetch is in flight and
    /// the slot is not gated.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> CacheRead<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FeedResult<T>> + Send + 'static,
    {
        let shared = {
            let mut slots = self.inner.slots.lock();
            let now = self.inner.clock.now_ms();
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| CacheSlot::new(self.inner.config.base_backoff_ms));

            if let Some(in_flight) = &slot.in_flight {
                Metrics::cache_coalesced(self.inner.name);
                in_flight.clone()
            } else if now < slot.next_allowed_at_ms {
                Metrics::cache_gated(self.inner.name);
                return slot.read();
            } else {
                slot.last_attempt_at_ms = Some(now);
                let shared = self.spawn_fetch(key.clone(), fetch());
                slot.in_flight = Some(shared.clone());
                shared
            }
        };

        // The outcome is already recorded in the slot by the fetch task.
        let _ = shared.await;

        self.inner
            .slots
            .lock()
            .get(&key)
            .map(CacheSlot::read)
            .unwrap_or_else(CacheRead::empty)
    }

    /// Read `key` without ever fetching.
    pub fn peek(&self, key: &K) -> CacheRead<T> {
        self.inner
            .slots
            .lock()
            .get(key)
            .map(CacheSlot::read)
            .unwrap_or_else(CacheRead::empty)
    }

    /// Diagnostics for every slot.
    pub fn status(&self) -> Vec<(K, SlotStatus)> {
        self.inner
            .slots
            .lock()
            .iter()
            .map(|(k, slot)| (k.clone(), slot.status()))
            .collect()
    }

    pub fn slot_status(&self, key: &K) -> Option<SlotStatus> {
        self.inner.slots.lock().get(key).map(CacheSlot::status)
    }

    fn spawn_fetch<Fut>(&self, key: K, fetch: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = FeedResult<T>> + Send + 'static,
    {
        let timeout_ms = self.inner.config.fetch_timeout_ms;
        let inner = Arc::clone(&self.inner);

        debug!(cache = self.inner.name, scope = %key, "Starting upstream fetch");

        let handle = tokio::spawn(async move {
            let guard = FetchGuard {
                inner,
                key,
                done: false,
            };
            let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), fetch).await
            {
                Ok(result) => result,
                Err(_) => Err(FeedError::Timeout(timeout_ms)),
            };
            guard.complete(&result);
            result
        });

        let fut: BoxFuture<'static, FeedResult<T>> = Box::pin(async move {
            // A failed task already cleared the slot through its guard.
            handle
                .await
                .unwrap_or_else(|join_err| Err(FeedError::TaskFailed(join_err.to_string())))
        });
        fut.shared()
    }
}

/// Clears the slot's in-flight handle when the fetch task ends, including
/// by panic or cancellation, where nothing else would.
struct FetchGuard<K, T>
where
    K: Eq + Hash + Clone + fmt::Display,
    T: Clone,
{
    inner: Arc<Inner<K, T>>,
    key: K,
    done: bool,
}

impl<K, T> FetchGuard<K, T>
where
    K: Eq + Hash + Clone + fmt::Display,
    T: Clone,
{
    fn complete(mut self, result: &FeedResult<T>) {
        self.done = true;
        self.inner.complete(&self.key, result);
    }
}

impl<K, T> Drop for FetchGuard<K, T>
where
    K: Eq + Hash + Clone + fmt::Display,
    T: Clone,
{
    fn drop(&mut self) {
        if !self.done {
            let result = Err(FeedError::TaskFailed("fetch task aborted".to_string()));
            self.inner.complete(&self.key, &result);
        }
    }
}
