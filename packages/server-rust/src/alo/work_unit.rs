//! The contract between a supervisor and the computation it drives.

use std::future::Future;
use std::sync::Arc;

use alo_core::{AloInfo, Request};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::failure::Outcome;
use super::liveness::HeartbeatMonitor;

/// A long-running computation driven by a supervisor.
///
/// Implementations report progress through the [`WorkUnitContext`]: they
/// should call `mark_started` once running, `heartbeat` periodically, and
/// honour cancellation.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    async fn run(&self, ctx: WorkUnitContext) -> Outcome;
}

/// Adapter turning an async closure into a [`WorkUnit`].
pub struct WorkUnitFn<F>(F);

/// Wrap `f` as a [`WorkUnit`].
pub fn work_unit_fn<F, Fut>(f: F) -> WorkUnitFn<F>
where
    F: Fn(WorkUnitContext) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    WorkUnitFn(f)
}

#[async_trait]
impl<F, Fut> WorkUnit for WorkUnitFn<F>
where
    F: Fn(WorkUnitContext) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    async fn run(&self, ctx: WorkUnitContext) -> Outcome {
        (self.0)(ctx).await
    }
}

/// Signals flowing from a work unit or caller into the supervisor loop.
#[derive(Debug)]
pub(crate) enum Signal {
    Started(AloInfo),
    Cancel,
}

type CancelHandler = Box<dyn FnOnce() + Send>;

/// Cancellation state shared by the supervisor and the work-unit context.
#[derive(Default)]
pub(crate) struct CancelSlot {
    token: CancellationToken,
    handler: Mutex<Option<CancelHandler>>,
}

impl CancelSlot {
    /// Mark cancelled and run the installed handler, if any.
    pub(crate) fn propagate(&self) {
        let handler = {
            let mut slot = self.handler.lock();
            self.token.cancel();
            slot.take()
        };
        if let Some(handler) = handler {
            handler();
        }
    }
}

/// Handle given to a running work unit.
///
/// Cheap to clone; every clone reports into the same supervisor.
#[derive(Clone)]
pub struct WorkUnitContext {
    request: Arc<Request>,
    signals: mpsc::UnboundedSender<Signal>,
    cancel: Arc<CancelSlot>,
    monitor: Arc<HeartbeatMonitor>,
}

impl WorkUnitContext {
    pub(crate) fn new(
        request: Arc<Request>,
        signals: mpsc::UnboundedSender<Signal>,
        cancel: Arc<CancelSlot>,
        monitor: Arc<HeartbeatMonitor>,
    ) -> Self {
        Self {
            request,
            signals,
            cancel,
            monitor,
        }
    }

    /// The start request that created this operation.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The operation's ALO id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.request.request_id
    }

    /// Report the operation as started, with `info` as its snapshot.
    ///
    /// Safe to call repeatedly; later calls refresh the snapshot. Calls after
    /// the supervisor has finished are ignored.
    pub fn mark_started(&self, info: AloInfo) {
        let _ = self.signals.send(Signal::Started(info));
    }

    /// Record that the work unit is alive.
    pub fn heartbeat(&self) {
        self.monitor.heartbeat(self.id());
    }

    /// Install the function run when cancellation reaches this work unit.
    ///
    /// Replaces any previously installed handler. If cancellation has already
    /// been propagated, `handler` runs immediately on the calling thread.
    pub fn set_cancel_handler<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut slot = self.cancel.handler.lock();
            if !self.cancel.token.is_cancelled() {
                *slot = Some(Box::new(handler));
                return;
            }
        }
        handler();
    }

    /// Returns `true` once cancellation has been propagated.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.token.is_cancelled()
    }

    /// Completes once cancellation has been propagated.
    pub async fn cancelled(&self) {
        self.cancel.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn context() -> (WorkUnitContext, mpsc::UnboundedReceiver<Signal>, Arc<CancelSlot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = Arc::new(CancelSlot::default());
        let ctx = WorkUnitContext::new(
            Arc::new(Request::new("r1", "svc", "op")),
            tx,
            Arc::clone(&slot),
            Arc::new(HeartbeatMonitor::new()),
        );
        (ctx, rx, slot)
    }

    #[test]
    fn cancel_handler_runs_on_propagation() {
        let (ctx, _rx, slot) = context();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        ctx.set_cancel_handler(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        slot.propagate();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn late_handler_runs_immediately() {
        let (ctx, _rx, slot) = context();
        slot.propagate();

        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        ctx.set_cancel_handler(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mark_started_sends_signal() {
        let (ctx, mut rx, _slot) = context();
        ctx.mark_started(AloInfo::running("r1"));
        ctx.mark_started(AloInfo::running("r1"));
        assert!(matches!(rx.try_recv(), Ok(Signal::Started(_))));
        assert!(matches!(rx.try_recv(), Ok(Signal::Started(_))));
        assert_eq!(ctx.id(), "r1");
    }

    #[test]
    fn heartbeat_reaches_monitor() {
        let (ctx, _rx, _slot) = context();
        assert!(ctx.monitor.last_heartbeat("r1").is_none());
        ctx.heartbeat();
        assert!(ctx.monitor.last_heartbeat("r1").is_some());
    }

    #[tokio::test]
    async fn cancelled_future_completes_after_propagation() {
        let (ctx, _rx, slot) = context();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.cancelled().await }
        });
        slot.propagate();
        waiter.await.unwrap();
    }
}
