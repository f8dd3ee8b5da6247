//! Async driver around [`SupervisorState`].
//!
//! Each supervised operation runs as one tokio task. The task spawns the work
//! unit and funnels its completion, started/cancel signals and the one-shot
//! start timer into a single biased `select!` loop; each iteration turns one
//! source into an [`Event`], applies it to the pure state and executes the
//! returned [`Effect`]s. Completion is polled first, so a result that is
//! ready wins over a cancel or timer that fired in the same instant.
//!
//! Callers observe the operation through a [`SupervisorHandle`]: the snapshot
//! is an `ArcSwapOption` readable without blocking, and the terminal result
//! is published on a `watch` channel.

use std::sync::Arc;

use alo_core::{AloInfo, Request};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::Instrument;

use super::callback::{CallbackError, CallbackInvoker, Completion};
use super::config::SupervisorConfig;
use super::failure::{AloFailure, Outcome};
use super::liveness::HeartbeatMonitor;
use super::state::{Effect, Event, Phase, SupervisorState};
use super::work_unit::{CancelSlot, Signal, WorkUnit, WorkUnitContext};

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Spawns supervisors sharing one configuration, heartbeat monitor and
/// callback invoker.
#[derive(Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
    monitor: Arc<HeartbeatMonitor>,
    callback: Option<Arc<dyn CallbackInvoker>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig, monitor: Arc<HeartbeatMonitor>) -> Self {
        Self {
            config,
            monitor,
            callback: None,
        }
    }

    /// Deliver completion callbacks through `invoker`.
    #[must_use]
    pub fn with_callback_invoker(mut self, invoker: Arc<dyn CallbackInvoker>) -> Self {
        self.callback = Some(invoker);
        self
    }

    /// Start supervising `unit` for `request`.
    ///
    /// The operation's id is the request id. Must be called from within a
    /// tokio runtime.
    #[must_use]
    pub fn spawn(&self, request: Request, unit: Arc<dyn WorkUnit>) -> SupervisorHandle {
        let request = Arc::new(request);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id: request.request_id.clone(),
            signals: signal_tx.clone(),
            snapshot: ArcSwapOption::empty(),
            phase: watch::Sender::new(Phase::Pending),
            outcome: watch::Sender::new(None),
            history: Mutex::new(Vec::new()),
            completed_at: Mutex::new(None),
        });

        let cancel = Arc::new(CancelSlot::default());
        let ctx = WorkUnitContext::new(
            Arc::clone(&request),
            signal_tx,
            Arc::clone(&cancel),
            Arc::clone(&self.monitor),
        );
        let work = tokio::spawn(async move { unit.run(ctx).await });

        let span = tracing::info_span!(
            "alo",
            alo_id = %request.request_id,
            service = %request.service,
            operation = %request.operation,
        );
        let driver = Driver {
            state: SupervisorState::new(
                request.request_id.clone(),
                self.config.start_timeout,
                request.http_callback.is_some(),
            ),
            shared: Arc::clone(&shared),
            request,
            config: self.config.clone(),
            cancel,
            callback: self.callback.clone(),
            monitor: Arc::clone(&self.monitor),
        };
        tokio::spawn(driver.run(work, signal_rx).instrument(span));

        SupervisorHandle { shared }
    }
}

// ---------------------------------------------------------------------------
// SupervisorHandle
// ---------------------------------------------------------------------------

struct Shared {
    id: String,
    signals: mpsc::UnboundedSender<Signal>,
    snapshot: ArcSwapOption<AloInfo>,
    phase: watch::Sender<Phase>,
    outcome: watch::Sender<Option<Outcome>>,
    history: Mutex<Vec<Event>>,
    completed_at: Mutex<Option<Instant>>,
}

/// Caller-side view of one supervised operation. Cheap to clone.
#[derive(Clone)]
pub struct SupervisorHandle {
    shared: Arc<Shared>,
}

impl SupervisorHandle {
    /// The operation's ALO id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Current snapshot; `None` until the operation has started or completed.
    #[must_use]
    pub fn info(&self) -> Option<AloInfo> {
        self.shared.snapshot.load_full().map(|info| (*info).clone())
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.shared.phase.borrow()
    }

    /// Terminal result, if already available.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.outcome.borrow().clone()
    }

    /// When the terminal result was published.
    #[must_use]
    pub fn completed_at(&self) -> Option<Instant> {
        *self.shared.completed_at.lock()
    }

    /// Ask the operation to cancel. Idempotent; ignored after completion.
    pub fn cancel(&self) {
        let _ = self.shared.signals.send(Signal::Cancel);
    }

    /// Waits until the operation has left `Pending` and returns its phase.
    pub async fn started(&self) -> Phase {
        let mut rx = self.shared.phase.subscribe();
        rx.wait_for(|phase| *phase != Phase::Pending)
            .await
            .map_or(Phase::Completed, |phase| *phase)
    }

    /// Waits for the terminal result.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.shared.outcome.subscribe();
        let resolved = rx.wait_for(Option::is_some).await;
        match resolved.as_deref() {
            Ok(Some(outcome)) => outcome.clone(),
            _ => Err(AloFailure::Internal("supervisor stopped".to_string())),
        }
    }

    /// Every event the decision loop has applied, in order.
    #[must_use]
    pub fn history(&self) -> Vec<Event> {
        self.shared.history.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Driver {
    state: SupervisorState,
    shared: Arc<Shared>,
    request: Arc<Request>,
    config: SupervisorConfig,
    cancel: Arc<CancelSlot>,
    callback: Option<Arc<dyn CallbackInvoker>>,
    monitor: Arc<HeartbeatMonitor>,
}

impl Driver {
    async fn run(
        mut self,
        mut work: JoinHandle<Outcome>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        let timer = tokio::time::sleep(self.config.start_timeout);
        tokio::pin!(timer);
        let mut timer_fired = false;

        loop {
            let event = tokio::select! {
                biased;
                joined = &mut work => Event::Completed(flatten(joined)),
                Some(signal) = signals.recv() => match signal {
                    Signal::Started(info) => Event::Started(info),
                    Signal::Cancel => Event::CancelRequested,
                },
                () = &mut timer, if !timer_fired => {
                    timer_fired = true;
                    Event::StartTimeoutFired
                }
            };

            let mut resolved = false;
            for effect in self.record(event) {
                match effect {
                    Effect::PropagateCancel => {
                        tracing::debug!("propagating cancellation to work unit");
                        self.cancel.propagate();
                    }
                    Effect::AbortWorkUnit => {
                        tracing::warn!(
                            timeout = ?self.config.start_timeout,
                            "ALO did not report start in time, aborting work unit"
                        );
                        work.abort();
                    }
                    Effect::PublishInfo(info) => self.publish(info),
                    Effect::InvokeCallback(outcome) => self.invoke_callback(&outcome).await,
                    Effect::Resolve(outcome) => {
                        self.resolve(outcome);
                        resolved = true;
                    }
                }
            }
            if resolved {
                break;
            }
        }
    }

    fn record(&mut self, event: Event) -> Vec<Effect> {
        {
            let mut history = self.shared.history.lock();
            // A repeated identical started signal changes nothing on replay.
            let repeat = matches!(event, Event::Started(_)) && history.last() == Some(&event);
            if !repeat {
                history.push(event.clone());
            }
        }
        self.state.apply(event)
    }

    fn publish(&self, info: AloInfo) {
        let phase = self.state.phase();
        let was_pending = *self.shared.phase.borrow() == Phase::Pending;
        if was_pending && phase == Phase::Running {
            tracing::info!("ALO started");
            self.monitor.heartbeat(&self.shared.id);
        }
        self.shared.snapshot.store(Some(Arc::new(info)));
        self.shared.phase.send_replace(phase);
    }

    async fn invoke_callback(&mut self, outcome: &Outcome) {
        let Some(target) = self.request.http_callback.as_ref() else {
            return;
        };
        let Some(invoker) = self.callback.as_ref() else {
            tracing::warn!(url = %target.url, "no callback invoker configured, dropping completion");
            self.record(Event::CallbackAttempted);
            return;
        };

        let limit = self.config.callback_timeout;
        let result =
            tokio::time::timeout(limit, invoker.invoke(target, Completion::from(outcome)))
                .await
                .unwrap_or(Err(CallbackError::TimedOut(limit)));
        match result {
            Ok(()) => tracing::debug!(url = %target.url, "completion callback delivered"),
            Err(err) => tracing::warn!(url = %target.url, error = %err, "failed invoking callback"),
        }
        self.record(Event::CallbackAttempted);
    }

    fn resolve(&self, outcome: Outcome) {
        match &outcome {
            Ok(output) => tracing::info!(bytes = output.len(), "ALO completed"),
            Err(failure) => tracing::info!(error = %failure, "ALO failed"),
        }
        self.monitor.remove(&self.shared.id);
        *self.shared.completed_at.lock() = Some(Instant::now());
        self.shared.outcome.send_replace(Some(outcome));
    }
}

fn flatten(joined: Result<Outcome, JoinError>) -> Outcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) if err.is_cancelled() => Err(AloFailure::Cancelled),
        Err(err) => Err(AloFailure::Internal(format!("work unit panicked: {err}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use alo_core::{codes, AloStatus, ResponseFailure};

    use super::*;
    use crate::alo::callback::RecordingInvoker;
    use crate::alo::work_unit::work_unit_fn;

    fn supervisor() -> Supervisor {
        Supervisor::new(SupervisorConfig::default(), Arc::new(HeartbeatMonitor::new()))
    }

    fn request(id: &str) -> Request {
        Request::new(id, "svc", "op")
    }

    #[tokio::test(start_paused = true)]
    async fn success_path_reports_running_then_completed() {
        let unit = work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running(ctx.id()).with_metadata("stage", "one"));
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AloFailure>(b"result".to_vec())
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));

        assert_eq!(handle.started().await, Phase::Running);
        let info = handle.info().unwrap();
        assert_eq!(info.status, AloStatus::Running);
        assert_eq!(info.metadata["stage"], "one");

        assert_eq!(handle.wait().await, Ok(b"result".to_vec()));
        let info = handle.info().unwrap();
        assert_eq!(info.status, AloStatus::Completed);
        assert_eq!(info.metadata["stage"], "one");
        assert!(handle.completed_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_absent_while_pending() {
        let unit = work_unit_fn(|_ctx: WorkUnitContext| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, AloFailure>(Vec::new())
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));
        tokio::task::yield_now().await;
        assert!(handle.info().is_none());
        assert_eq!(handle.phase(), Phase::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn start_timeout_fails_and_cancels_work() {
        let cancelled = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&cancelled);
        let unit = work_unit_fn(move |ctx: WorkUnitContext| {
            let seen = Arc::clone(&seen);
            async move {
                ctx.set_cancel_handler(move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                });
                std::future::pending::<Outcome>().await
            }
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));

        let outcome = handle.wait().await;
        assert_eq!(
            outcome,
            Err(AloFailure::OperationTimeout {
                after: Duration::from_secs(30)
            })
        );
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(handle.info(), Some(AloInfo::new("r1", AloStatus::Completed)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_propagates_once() {
        let cancelled = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&cancelled);
        let unit = work_unit_fn(move |ctx: WorkUnitContext| {
            let seen = Arc::clone(&seen);
            async move {
                ctx.set_cancel_handler(move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                });
                ctx.mark_started(AloInfo::running(ctx.id()));
                ctx.cancelled().await;
                Err::<Vec<u8>, _>(AloFailure::Application(ResponseFailure::with_message(
                    codes::CANCELLED,
                    "stopped",
                )))
            }
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));
        handle.started().await;

        handle.cancel();
        handle.cancel();
        let outcome = handle.wait().await;

        assert!(matches!(outcome, Err(AloFailure::Application(_))));
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn work_may_succeed_after_cancel() {
        let unit = work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running(ctx.id()));
            ctx.cancelled().await;
            Ok::<_, AloFailure>(b"finished anyway".to_vec())
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));
        handle.started().await;
        handle.cancel();
        assert_eq!(handle.wait().await, Ok(b"finished anyway".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn callback_invoked_once_with_failure_translation() {
        let invoker = Arc::new(RecordingInvoker::default());
        let supervisor = supervisor().with_callback_invoker(invoker.clone());
        let unit = work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running(ctx.id()));
            Err::<Vec<u8>, _>(AloFailure::Cancelled)
        });
        let req = request("r1").with_http_callback("http://cb/done");
        let handle = supervisor.spawn(req, Arc::new(unit));

        assert_eq!(handle.wait().await, Err(AloFailure::Cancelled));
        let calls = invoker.calls.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://cb/done");
        assert!(matches!(
            &calls[0].1,
            Completion::Failure(failure) if failure.code == codes::CANCELLED
        ));
        assert!(handle.history().contains(&Event::CallbackAttempted));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_callback_does_not_change_result() {
        let invoker = Arc::new(RecordingInvoker {
            fail: true,
            ..RecordingInvoker::default()
        });
        let supervisor = supervisor().with_callback_invoker(invoker.clone());
        let unit = work_unit_fn(|_ctx: WorkUnitContext| async move {
            Ok::<_, AloFailure>(b"ok".to_vec())
        });
        let handle = supervisor.spawn(request("r1").with_http_callback("http://cb"), Arc::new(unit));

        assert_eq!(handle.wait().await, Ok(b"ok".to_vec()));
        assert_eq!(invoker.calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callback_is_bounded() {
        let invoker = Arc::new(RecordingInvoker {
            delay: Some(Duration::from_secs(3600)),
            ..RecordingInvoker::default()
        });
        let supervisor = supervisor().with_callback_invoker(invoker);
        let unit = work_unit_fn(|_ctx: WorkUnitContext| async move {
            Ok::<_, AloFailure>(b"ok".to_vec())
        });
        let handle = supervisor.spawn(request("r1").with_http_callback("http://cb"), Arc::new(unit));

        let started = Instant::now();
        assert_eq!(handle.wait().await, Ok(b"ok".to_vec()));
        assert!(started.elapsed() <= Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn no_callback_without_request_callback() {
        let invoker = Arc::new(RecordingInvoker::default());
        let supervisor = supervisor().with_callback_invoker(invoker.clone());
        let unit = work_unit_fn(|_ctx: WorkUnitContext| async move {
            Ok::<_, AloFailure>(Vec::new())
        });
        let handle = supervisor.spawn(request("r1"), Arc::new(unit));

        handle.wait().await.unwrap();
        assert!(invoker.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_work_unit_is_internal_failure() {
        let unit = work_unit_fn(|_ctx: WorkUnitContext| async move {
            let payload: Option<Vec<u8>> = None;
            Ok::<_, AloFailure>(payload.expect("work unit exploded"))
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));
        assert!(matches!(handle.wait().await, Err(AloFailure::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn history_replays_to_final_state() {
        let invoker = Arc::new(RecordingInvoker::default());
        let supervisor = supervisor().with_callback_invoker(invoker);
        let unit = work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running(ctx.id()));
            ctx.mark_started(AloInfo::running(ctx.id()).with_metadata("pct", "50"));
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, AloFailure>(b"done".to_vec())
        });
        let handle = supervisor.spawn(request("r1").with_http_callback("http://cb"), Arc::new(unit));
        handle.wait().await.unwrap();

        let fresh = SupervisorState::new("r1", Duration::from_secs(30), true);
        let (replayed, effects) = fresh.replay(&handle.history());
        assert_eq!(replayed.phase(), Phase::Completed);
        assert_eq!(replayed.info().cloned(), handle.info());
        assert!(!effects.iter().any(|e| matches!(e, Effect::InvokeCallback(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn identical_started_signals_collapse_in_history() {
        let unit = work_unit_fn(|ctx: WorkUnitContext| async move {
            for _ in 0..50 {
                ctx.mark_started(AloInfo::running(ctx.id()).with_metadata("pct", "10"));
            }
            ctx.mark_started(AloInfo::running(ctx.id()).with_metadata("pct", "20"));
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, AloFailure>(Vec::new())
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));
        handle.wait().await.unwrap();

        let started = handle
            .history()
            .iter()
            .filter(|e| matches!(e, Event::Started(_)))
            .count();
        assert_eq!(started, 2);
        assert_eq!(handle.info().unwrap().metadata["pct"], "20");

        let fresh = SupervisorState::new("r1", Duration::from_secs(30), false);
        let (replayed, _) = fresh.replay(&handle.history());
        assert_eq!(replayed.info().cloned(), handle.info());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_keeps_request_id_whatever_the_unit_reports() {
        let unit = work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running("external-handle"));
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, AloFailure>(Vec::new())
        });
        let handle = supervisor().spawn(request("r1"), Arc::new(unit));

        handle.started().await;
        assert_eq!(handle.info().unwrap().id, "r1");
        handle.wait().await.unwrap();
        assert_eq!(handle.info().unwrap().id, "r1");
    }
}
