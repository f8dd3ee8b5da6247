//! Wraps an arbitrary async computation as a [`WorkUnit`].
//!
//! The adapter launches the computation on its own task, reports the
//! operation started, forwards cancellation into the computation through a
//! `CancellationToken` and heartbeats until the computation finishes.

use std::future::Future;

use alo_core::{AloInfo, Request};
use async_trait::async_trait;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::AdapterConfig;
use super::failure::{AloFailure, Outcome};
use super::work_unit::{WorkUnit, WorkUnitContext};

/// Work unit running `task(request, cancel)`.
///
/// The computation receives the start request and a token that is cancelled
/// when cancellation reaches the operation. If it has not finished within
/// `cancel_grace` of that, the adapter aborts it and reports
/// `AloFailure::Cancelled`.
pub struct TaskAdapter<F> {
    task: F,
    config: AdapterConfig,
}

impl<F, Fut> TaskAdapter<F>
where
    F: Fn(Request, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    #[must_use]
    pub fn new(task: F) -> Self {
        Self::with_config(task, AdapterConfig::default())
    }

    #[must_use]
    pub fn with_config(task: F, config: AdapterConfig) -> Self {
        Self { task, config }
    }
}

#[async_trait]
impl<F, Fut> WorkUnit for TaskAdapter<F>
where
    F: Fn(Request, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    async fn run(&self, ctx: WorkUnitContext) -> Outcome {
        let token = CancellationToken::new();
        let mut computation = tokio::spawn((self.task)(ctx.request().clone(), token.clone()));

        ctx.mark_started(AloInfo::running(ctx.id()));
        let forward = token.clone();
        ctx.set_cancel_handler(move || forward.cancel());

        let mut heartbeats = tokio::time::interval(self.config.heartbeat_interval);
        heartbeats.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let grace = tokio::time::sleep(self.config.cancel_grace);
        tokio::pin!(grace);
        let mut grace_armed = false;

        loop {
            tokio::select! {
                biased;
                joined = &mut computation => return flatten(joined),
                () = token.cancelled(), if !grace_armed => {
                    grace.as_mut().reset(Instant::now() + self.config.cancel_grace);
                    grace_armed = true;
                }
                () = &mut grace, if grace_armed => {
                    tracing::warn!(
                        alo_id = %ctx.id(),
                        grace = ?self.config.cancel_grace,
                        "computation ignored cancellation, aborting"
                    );
                    computation.abort();
                    return Err(AloFailure::Cancelled);
                }
                _ = heartbeats.tick() => ctx.heartbeat(),
            }
        }
    }
}

fn flatten(joined: Result<Outcome, JoinError>) -> Outcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) if err.is_cancelled() => Err(AloFailure::Cancelled),
        Err(err) => Err(AloFailure::Internal(format!("computation panicked: {err}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
