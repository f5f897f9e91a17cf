//! Periodic tick scheduler.
//!
//! Fires the tick closure every period on a tokio interval. Each tick runs
//! in its own task, so a slow tick never delays the next one; overlapping
//! ticks are serialized where it matters by the execution lock. Stopping
//! cancels the loop but lets in-flight ticks finish.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
    Suspended,
}

struct Running {
    token: CancellationToken,
    period: Duration,
}

#[derive(Default)]
pub struct Scheduler {
    running: Mutex<Option<Running>>,
    suspended: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `period`. Returns false if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, period: Duration, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.launch(period, false, tick)
    }

    /// Start the loop already suspended: no tick runs until [`resume`].
    ///
    /// [`resume`]: Scheduler::resume
    pub fn start_suspended<F, Fut>(&self, period: Duration, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.launch(period, true, tick)
    }

    fn launch<F, Fut>(&self, period: Duration, start_suspended: bool, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let suspended = Arc::clone(&self.suspended);
        // Set before the loop exists, so its first tick sees it.
        suspended.store(start_suspended, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if suspended.load(Ordering::SeqCst) {
                            debug!("Tick skipped, scheduler suspended");
                            continue;
                        }
                        // `stop` cancels before clearing the flag, so a
                        // cleared flag read above implies this is visible.
                        if loop_token.is_cancelled() {
                            break;
                        }
                        tokio::spawn(tick());
                    }
                }
            }
            debug!("Scheduler loop exited");
        });

        info!(
            period_ms = millis(period),
            suspended = start_suspended,
            "Scheduler started"
        );
        *running = Some(Running { token, period });
        true
    }

    /// Stop ticking. Returns false if not running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        running.token.cancel();
        self.suspended.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");
        true
    }

    /// Keep the loop alive but skip ticks. Returns false if not running.
    pub fn suspend(&self) -> bool {
        if self.running.lock().is_none() {
            return false;
        }
        if !self.suspended.swap(true, Ordering::SeqCst) {
            info!("Scheduler suspended");
        }
        true
    }

    pub fn resume(&self) -> bool {
        if self.running.lock().is_none() {
            return false;
        }
        if self.suspended.swap(false, Ordering::SeqCst) {
            info!("Scheduler resumed");
        }
        true
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.lock().is_none() {
            SchedulerState::Stopped
        } else if self.suspended.load(Ordering::SeqCst) {
            SchedulerState::Suspended
        } else {
            SchedulerState::Running
        }
    }

    pub fn period(&self) -> Option<Duration> {
        self.running.lock().as_ref().map(|r| r.period)
    }
}

fn millis(period: Duration) -> u64 {
    u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}
