//! Owns every supervisor of one worker process.
//!
//! `AloHost` maps `(service, operation)` to the work unit that implements it
//! and ALO ids to running or archived supervisors. It implements
//! [`AloHandler`], so registering it with an `OperationRouter` exposes the
//! start/get/cancel/wait quartet for each of its operations.

use std::sync::Arc;

use alo_core::{AloInfo, AloRef, AloStatus, Request, Response};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::callback::CallbackInvoker;
use super::config::AloHostConfig;
use super::liveness::{HeartbeatMonitor, LivenessSweeper};
use super::state::Phase;
use super::supervisor::{Supervisor, SupervisorHandle};
use super::work_unit::WorkUnit;
use crate::service::{BackgroundWorker, OperationError, OperationRouter, RegistrationError};
use crate::traits::AloHandler;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UnitKey {
    service: String,
    operation: String,
}

struct HostInner {
    config: AloHostConfig,
    supervisor: Supervisor,
    monitor: Arc<HeartbeatMonitor>,
    units: DashMap<UnitKey, Arc<dyn WorkUnit>>,
    supervisors: DashMap<String, SupervisorHandle>,
    stalled: RwLock<Vec<String>>,
}

/// Supervisor host. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct AloHost {
    inner: Arc<HostInner>,
}

impl AloHost {
    #[must_use]
    pub fn new(config: AloHostConfig) -> Self {
        Self::build(config, None)
    }

    /// A host whose supervisors deliver completion callbacks via `invoker`.
    #[must_use]
    pub fn with_callback_invoker(
        config: AloHostConfig,
        invoker: Arc<dyn CallbackInvoker>,
    ) -> Self {
        Self::build(config, Some(invoker))
    }

    fn build(config: AloHostConfig, invoker: Option<Arc<dyn CallbackInvoker>>) -> Self {
        let monitor = Arc::new(HeartbeatMonitor::new());
        let mut supervisor = Supervisor::new(config.supervisor.clone(), Arc::clone(&monitor));
        if let Some(invoker) = invoker {
            supervisor = supervisor.with_callback_invoker(invoker);
        }
        Self {
            inner: Arc::new(HostInner {
                config,
                supervisor,
                monitor,
                units: DashMap::new(),
                supervisors: DashMap::new(),
                stalled: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Make `unit` the implementation of `(service, operation)` and register
    /// the host for it on `router`.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError` if the router rejects the ALO binding; the
    /// work unit is not installed in that case.
    pub fn register<W>(
        &self,
        router: &mut OperationRouter,
        service: &str,
        operation: &str,
        unit: W,
    ) -> Result<(), RegistrationError>
    where
        W: WorkUnit + 'static,
    {
        router.register_alo(service, operation, self.clone())?;
        self.inner.units.insert(
            UnitKey {
                service: service.to_string(),
                operation: operation.to_string(),
            },
            Arc::new(unit),
        );
        tracing::debug!(service, operation, "registered ALO work unit");
        Ok(())
    }

    /// Handle of the supervisor for ALO `id`, if it is still retained.
    #[must_use]
    pub fn supervisor(&self, id: &str) -> Option<SupervisorHandle> {
        self.inner.supervisors.get(id).map(|entry| entry.clone())
    }

    /// Number of retained supervisors, running or archived.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.supervisors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.supervisors.is_empty()
    }

    /// The heartbeat monitor shared by all supervisors of this host.
    #[must_use]
    pub fn monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.inner.monitor
    }

    /// Running operations whose heartbeat was overdue at the last sweep.
    #[must_use]
    pub fn stalled(&self) -> Vec<String> {
        self.inner.stalled.read().clone()
    }

    /// Start the background liveness sweep.
    #[must_use]
    pub fn spawn_sweeper(&self) -> BackgroundWorker<LivenessSweeper> {
        BackgroundWorker::start(
            LivenessSweeper::new(self.clone()),
            self.inner.config.sweep_interval,
        )
    }

    /// Report stalled operations and evict expired archived ones.
    pub fn sweep(&self, now: Instant) {
        let config = &self.inner.config;

        let (stalled, stale): (Vec<String>, Vec<String>) = self
            .inner
            .monitor
            .overdue(config.heartbeat_timeout, now)
            .into_iter()
            .partition(|id| {
                self.inner
                    .supervisors
                    .get(id)
                    .is_some_and(|handle| handle.phase() == Phase::Running)
            });
        // Late heartbeats from units that already resolved.
        for id in &stale {
            self.inner.monitor.remove(id);
        }
        for id in &stalled {
            tracing::warn!(
                alo_id = %id,
                timeout = ?config.heartbeat_timeout,
                "ALO heartbeat overdue"
            );
        }
        *self.inner.stalled.write() = stalled;

        let before = self.inner.supervisors.len();
        self.inner.supervisors.retain(|_, handle| match handle.completed_at() {
            Some(at) => now.saturating_duration_since(at) < config.completed_retention,
            None => true,
        });
        let evicted = before.saturating_sub(self.inner.supervisors.len());
        if evicted > 0 {
            tracing::debug!(evicted, "evicted archived ALOs");
        }
    }

    fn unit_for(&self, req: &Request) -> Result<Arc<dyn WorkUnit>, OperationError> {
        self.inner
            .units
            .get(&UnitKey {
                service: req.service.clone(),
                operation: req.operation.clone(),
            })
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OperationError::UnknownOperation {
                service: req.service.clone(),
                operation: req.operation.clone(),
            })
    }

    fn lookup(&self, alo: &AloRef) -> Result<SupervisorHandle, OperationError> {
        self.supervisor(&alo.id)
            .ok_or_else(|| OperationError::NotFound { id: alo.id.clone() })
    }
}

#[async_trait]
impl AloHandler for AloHost {
    async fn start(&self, req: Request) -> Result<AloInfo, OperationError> {
        let handle = match self.supervisor(&req.request_id) {
            Some(existing) => existing,
            None => {
                let unit = self.unit_for(&req)?;
                let id = req.request_id.clone();
                self.inner
                    .supervisors
                    .entry(id)
                    .or_insert_with(|| self.inner.supervisor.spawn(req, unit))
                    .clone()
            }
        };

        handle.started().await;
        Ok(handle
            .info()
            .unwrap_or_else(|| AloInfo::new(handle.id(), AloStatus::Completed)))
    }

    async fn info(&self, alo: &AloRef) -> Result<AloInfo, OperationError> {
        let handle = self.lookup(alo)?;
        Ok(handle
            .info()
            .unwrap_or_else(|| AloInfo::new(handle.id(), AloStatus::Unspecified)))
    }

    async fn cancel(&self, alo: &AloRef) -> Result<(), OperationError> {
        self.lookup(alo)?.cancel();
        Ok(())
    }

    async fn wait(&self, alo: &AloRef) -> Result<Response, OperationError> {
        let handle = self.lookup(alo)?;
        match handle.wait().await {
            Ok(output) => Ok(Response::output(output)),
            Err(failure) => Err(OperationError::Application(failure.to_response_failure())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use alo_core::codes;

    use super::*;
    use crate::alo::work_unit::{work_unit_fn, WorkUnitContext};
    use crate::alo::AloFailure;

    fn host_with<W: WorkUnit + 'static>(unit: W) -> (AloHost, OperationRouter) {
        let host = AloHost::new(AloHostConfig::default());
        let mut router = OperationRouter::new();
        host.register(&mut router, "svc", "job", unit).unwrap();
        (host, router)
    }

    fn job(id: &str) -> Request {
        Request::new(id, "svc", "job")
    }

    fn alo(id: &str) -> AloRef {
        AloRef::new("svc", "job", id)
    }

    fn sleeper() -> impl WorkUnit {
        work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running(ctx.id()));
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AloFailure>(b"slept".to_vec())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn register_binds_four_operations() {
        let (_host, router) = host_with(sleeper());
        for op in ["job", "job/get", "job/cancel", "job/wait"] {
            assert!(router.contains("svc", op), "missing {op}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_returns_running_snapshot() {
        let (host, _router) = host_with(sleeper());
        let info = host.start(job("r1")).await.unwrap();
        assert_eq!(info, AloInfo::running("r1"));
        assert_eq!(host.info(&alo("r1")).await.unwrap().status, AloStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_by_request_id() {
        let runs = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&runs);
        let (host, _router) = host_with(work_unit_fn(move |ctx: WorkUnitContext| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move {
                ctx.mark_started(AloInfo::running(ctx.id()));
                Ok::<_, AloFailure>(Vec::new())
            }
        }));

        host.start(job("r1")).await.unwrap();
        host.start(job("r1")).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(host.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_payload() {
        let (host, _router) = host_with(sleeper());
        host.start(job("r1")).await.unwrap();
        let resp = host.wait(&alo("r1")).await.unwrap();
        assert_eq!(resp.output, b"slept");
        assert!(!resp.alo_info);
        assert_eq!(host.info(&alo("r1")).await.unwrap().status, AloStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_translates_failure() {
        let (host, _router) = host_with(work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running(ctx.id()));
            Err::<Vec<u8>, _>(AloFailure::Cancelled)
        }));
        host.start(job("r1")).await.unwrap();
        let err = host.wait(&alo("r1")).await.unwrap_err();
        assert_eq!(err.code(), codes::CANCELLED);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_id_is_not_found() {
        let (host, _router) = host_with(sleeper());
        assert!(matches!(
            host.info(&alo("ghost")).await,
            Err(OperationError::NotFound { .. })
        ));
        assert!(matches!(
            host.cancel(&alo("ghost")).await,
            Err(OperationError::NotFound { .. })
        ));
        assert!(matches!(
            host.wait(&alo("ghost")).await,
            Err(OperationError::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn start_for_unregistered_operation_fails() {
        let (host, _router) = host_with(sleeper());
        let err = host
            .start(Request::new("r1", "svc", "other"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::UNIMPLEMENTED);
        assert!(host.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_operations_are_evicted_after_retention() {
        let (host, _router) = host_with(sleeper());
        host.start(job("r1")).await.unwrap();
        host.wait(&alo("r1")).await.unwrap();

        host.sweep(Instant::now() + Duration::from_secs(60));
        assert!(host.info(&alo("r1")).await.is_ok());

        host.sweep(Instant::now() + Duration::from_secs(301));
        assert!(matches!(
            host.info(&alo("r1")).await,
            Err(OperationError::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_running_operation_is_reported_stalled() {
        let (host, _router) = host_with(work_unit_fn(|ctx: WorkUnitContext| async move {
            ctx.mark_started(AloInfo::running(ctx.id()));
            ctx.cancelled().await;
            Ok::<_, AloFailure>(Vec::new())
        }));
        host.start(job("quiet")).await.unwrap();

        host.sweep(Instant::now() + Duration::from_secs(5));
        assert!(host.stalled().is_empty());

        host.sweep(Instant::now() + Duration::from_secs(11));
        assert_eq!(host.stalled(), vec!["quiet".to_string()]);
        assert_eq!(host.info(&alo("quiet")).await.unwrap().status, AloStatus::Running);

        host.cancel(&alo("quiet")).await.unwrap();
        host.wait(&alo("quiet")).await.unwrap();
        host.sweep(Instant::now() + Duration::from_secs(11));
        assert!(host.stalled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_in_background() {
        let (host, _router) = host_with(sleeper());
        host.start(job("r1")).await.unwrap();
        host.wait(&alo("r1")).await.unwrap();

        let mut sweeper = host.spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(302)).await;
        assert!(host.is_empty());
        sweeper.stop().await;
    }
}
