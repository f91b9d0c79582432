//! Reconciliation Scheduler
//!
//! Drives a manager's reconciliation tick on a fixed interval.
//!
//! - Ticks never overlap: the next tick is awaited only after the current
//!   tick's body completes, and missed ticks are delayed, not burst.
//! - The first tick fires one interval after start.
//! - Shutdown is checked between ticks by the scheduler and between records
//!   by the task itself through [`TickContext::is_cancelled`].
//!
//! # Example
//!
//! ```ignore
//! let shutdown = ShutdownSignal::new();
//! let handle = ReconciliationScheduler::new(Duration::from_secs(10))
//!     .spawn(order_manager.clone(), shutdown.listener());
//!
//! // ... later
//! shutdown.trigger();
//! handle.await?;
//! ```

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::metrics;

/// Owner side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Ask every listener to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side of the shutdown signal.
///
/// Dropping the `ShutdownSignal` without triggering it does not cancel.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// A listener that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without triggering: nothing can cancel us anymore
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Per-tick context handed to [`Reconcile::tick`].
#[derive(Debug, Clone)]
pub struct TickContext {
    /// 1-based tick counter for this task
    pub tick: u64,
    shutdown: ShutdownListener,
}

impl TickContext {
    pub fn new(tick: u64, shutdown: ShutdownListener) -> Self {
        Self { tick, shutdown }
    }

    /// Context for a tick driven by hand (tests, one-shot runs).
    pub fn detached() -> Self {
        Self::new(0, ShutdownListener::never())
    }

    /// Tasks check this between records and stop early when set.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// A task whose body runs once per scheduler tick.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Summary of what one tick did, logged by the scheduler.
    type Report: Debug + Send;

    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// One pass of the loop body. Must not fail: per-record errors are
    /// handled inside.
    async fn tick(&self, ctx: &TickContext) -> Self::Report;
}

/// Fixed-interval, non-reentrant runner for a [`Reconcile`] task.
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationScheduler {
    interval: Duration,
}

impl ReconciliationScheduler {
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the task on a background tokio task.
    ///
    /// The handle resolves to the number of ticks executed once shutdown is
    /// triggered and the in-flight tick (if any) has completed.
    pub fn spawn<T: Reconcile>(&self, task: Arc<T>, shutdown: ShutdownListener) -> JoinHandle<u64> {
        let scheduler = *self;
        tokio::spawn(async move { scheduler.run(task, shutdown).await })
    }

    /// Run the task on the current task until shutdown.
    pub async fn run<T: Reconcile>(&self, task: Arc<T>, mut shutdown: ShutdownListener) -> u64 {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(task = task.name(), interval = ?self.interval, "Reconciliation loop started");

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            ticks += 1;
            let ctx = TickContext::new(ticks, shutdown.clone());
            let started = std::time::Instant::now();

            let report = task.tick(&ctx).await;

            metrics::record_tick_duration(task.name(), started.elapsed().as_secs_f64());
            debug!(task = task.name(), tick = ticks, report = ?report, "Tick complete");
        }

        info!(task = task.name(), ticks, "Reconciliation loop stopped");
        ticks
    }
}
