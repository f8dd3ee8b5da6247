//! Background worker for periodic host tasks.
//!
//! Provides a generic `BackgroundWorker<R>` that calls a `BackgroundRunnable`
//! at a fixed tick interval until stopped. The ALO host runs its liveness
//! sweep on one of these.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Periodic job executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// Called on each tick interval.
    async fn on_tick(&mut self);

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker driving a [`BackgroundRunnable`].
///
/// The spawned task:
/// 1. Calls `BackgroundRunnable::on_tick()` at the configured interval
/// 2. Calls `BackgroundRunnable::shutdown()` when stopped
///
/// Dropping the handle without calling [`stop`](Self::stop) still signals the
/// task to shut down, but does not wait for it.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
    _runnable: std::marker::PhantomData<fn() -> R>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the background worker with the given runnable and tick interval.
    pub fn start(mut runnable: R, tick_interval: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(tick_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticks.tick().await;

            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticks.tick() => runnable.on_tick().await,
                }
            }

            runnable.shutdown().await;
        });

        Self {
            shutdown,
            handle: Some(handle),
            _runnable: std::marker::PhantomData,
        }
    }

    /// Returns `true` until [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the worker gracefully, waiting for the worker task to complete.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl<R: BackgroundRunnable> Drop for BackgroundWorker<R> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
