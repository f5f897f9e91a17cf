//! Per-key execution lock.
//!
//! At most one order may be in flight per `(condition_id, leg)`. Contenders
//! get [`Busy`] immediately; there is no queueing. The ticket releases its
//! key on drop, so every exit path (fill, error, timeout, panic unwind)
//! frees the key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hedge_core::{ConditionId, DynClock, Leg};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lock key: one logical trading action on one market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LockKey {
    pub condition_id: ConditionId,
    pub leg: Leg,
}

impl LockKey {
    pub fn new(condition_id: ConditionId, leg: Leg) -> Self {
        Self { condition_id, leg }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.condition_id, self.leg)
    }
}

/// Another caller holds the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Busy {
    pub key: LockKey,
    pub held_since_ms: u64,
}

impl fmt::Display for Busy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in flight since {}", self.key, self.held_since_ms)
    }
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    token: u64,
    acquired_at_ms: u64,
}

/// Held key, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeldLock {
    pub key: LockKey,
    pub acquired_at_ms: u64,
}

/// Lock table.
#[derive(Clone)]
pub struct ExecutionLock {
    table: Arc<DashMap<LockKey, LockEntry>>,
    next_token: Arc<AtomicU64>,
    clock: DynClock,
}

impl ExecutionLock {
    #[must_use]
    pub fn new(clock: DynClock) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            next_token: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    /// Try to take `key`.
    ///
    /// Check and insert happen in one DashMap entry operation, so two racing
    /// callers can never both succeed.
    pub fn try_acquire(&self, key: LockKey) -> Result<LockTicket, Busy> {
        match self.table.entry(key.clone()) {
            Entry::Occupied(occupied) => Err(Busy {
                key,
                held_since_ms: occupied.get().acquired_at_ms,
            }),
            Entry::Vacant(vacant) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                vacant.insert(LockEntry {
                    token,
                    acquired_at_ms: self.clock.now_ms(),
                });
                Ok(LockTicket {
                    key,
                    token,
                    table: Arc::clone(&self.table),
                })
            }
        }
    }

    pub fn is_held(&self, key: &LockKey) -> bool {
        self.table.contains_key(key)
    }

    pub fn held_keys(&self) -> Vec<HeldLock> {
        let mut held: Vec<HeldLock> = self
            .table
            .iter()
            .map(|e| HeldLock {
                key: e.key().clone(),
                acquired_at_ms: e.value().acquired_at_ms,
            })
            .collect();
        held.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));
        held
    }
}

/// Exclusive right to trade one key. Released on drop.
#[derive(Debug)]
pub struct LockTicket {
    key: LockKey,
    token: u64,
    table: Arc<DashMap<LockKey, LockEntry>>,
}

impl LockTicket {
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for LockTicket {
    fn drop(&mut self) {
        self.table
            .remove_if(&self.key, |_, entry| entry.token == self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedge_core::ManualClock;

    fn lock() -> ExecutionLock {
        ExecutionLock::new(Arc::new(ManualClock::new(42)))
    }

    fn key(leg: Leg) -> LockKey {
        LockKey::new(ConditionId::from("0xabc"), leg)
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let lock = lock();
        let ticket = lock.try_acquire(key(Leg::Entry)).unwrap();

        let busy = lock.try_acquire(key(Leg::Entry)).unwrap_err();
        assert_eq!(busy.key, key(Leg::Entry));
        assert_eq!(busy.held_since_ms, 42);

        drop(ticket);
        assert!(lock.try_acquire(key(Leg::Entry)).is_ok());
    }

    #[test]
    fn test_distinct_keys_do_not_contend() {
        let lock = lock();
        let _entry = lock.try_acquire(key(Leg::Entry)).unwrap();
        let _hedge = lock.try_acquire(key(Leg::Hedge)).unwrap();
        let _other = lock
            .try_acquire(LockKey::new(ConditionId::from("0xdef"), Leg::Entry))
            .unwrap();

        assert_eq!(lock.held_keys().len(), 3);
    }

    #[test]
    fn test_release_on_drop() {
        let lock = lock();
        {
            let _ticket = lock.try_acquire(key(Leg::Exit)).unwrap();
            assert!(lock.is_held(&key(Leg::Exit)));
        }
        assert!(!lock.is_held(&key(Leg::Exit)));
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let lock = lock();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                std::thread::spawn(move || lock.try_acquire(key(Leg::Hedge)).ok())
            })
            .collect();

        // Tickets stay alive until the count is taken.
        let winners: Vec<LockTicket> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(winners.len(), 1);
    }
}
