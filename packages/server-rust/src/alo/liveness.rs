//! Heartbeat bookkeeping and the periodic liveness sweep.
//!
//! A missed heartbeat never changes a supervisor's state. The host only
//! reports stalled operations and evicts archived ones.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::host::AloHost;
use crate::service::BackgroundRunnable;

// ---------------------------------------------------------------------------
// HeartbeatMonitor
// ---------------------------------------------------------------------------

/// Deadline-based heartbeat tracker keyed by ALO id.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    last_seen: RwLock<HashMap<String, Instant>>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a heartbeat for `id` at the current time.
    pub fn heartbeat(&self, id: &str) {
        self.last_seen.write().insert(id.to_string(), Instant::now());
    }

    /// Time of the most recent heartbeat of `id`.
    #[must_use]
    pub fn last_heartbeat(&self, id: &str) -> Option<Instant> {
        self.last_seen.read().get(id).copied()
    }

    /// Returns `true` if `id` heartbeated within `timeout` of `now`.
    ///
    /// Untracked ids count as alive.
    #[must_use]
    pub fn is_alive(&self, id: &str, timeout: Duration, now: Instant) -> bool {
        match self.last_seen.read().get(id) {
            Some(&last) => now.saturating_duration_since(last) <= timeout,
            None => true,
        }
    }

    /// Ids whose last heartbeat is older than `timeout`, sorted.
    #[must_use]
    pub fn overdue(&self, timeout: Duration, now: Instant) -> Vec<String> {
        let mut ids: Vec<String> = self
            .last_seen
            .read()
            .iter()
            .filter(|(_, &last)| now.saturating_duration_since(last) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stops tracking `id`.
    pub fn remove(&self, id: &str) {
        self.last_seen.write().remove(id);
    }

    /// Number of tracked ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_seen.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// LivenessSweeper
// ---------------------------------------------------------------------------

/// Runs [`AloHost::sweep`] on every worker tick.
pub struct LivenessSweeper {
    host: AloHost,
}

impl LivenessSweeper {
    #[must_use]
    pub fn new(host: AloHost) -> Self {
        Self { host }
    }
}

#[async_trait]
impl BackgroundRunnable for LivenessSweeper {
    async fn on_tick(&mut self) {
        self.host.sweep(Instant::now());
    }

    async fn shutdown(&mut self) {
        tracing::debug!("liveness sweeper stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn heartbeat_keeps_id_alive() {
        let monitor = HeartbeatMonitor::new();
        monitor.heartbeat("a");

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(monitor.is_alive("a", TIMEOUT, Instant::now()));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!monitor.is_alive("a", TIMEOUT, Instant::now()));

        monitor.heartbeat("a");
        assert!(monitor.is_alive("a", TIMEOUT, Instant::now()));
    }

    #[test]
    fn unknown_id_is_alive() {
        let monitor = HeartbeatMonitor::new();
        assert!(monitor.is_alive("ghost", TIMEOUT, Instant::now()));
        assert!(monitor.last_heartbeat("ghost").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_lists_only_silent_ids() {
        let monitor = HeartbeatMonitor::new();
        monitor.heartbeat("quiet");
        monitor.heartbeat("chatty");

        tokio::time::advance(Duration::from_secs(8)).await;
        monitor.heartbeat("chatty");
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(monitor.overdue(TIMEOUT, Instant::now()), vec!["quiet"]);

        monitor.remove("quiet");
        assert!(monitor.overdue(TIMEOUT, Instant::now()).is_empty());
        assert_eq!(monitor.len(), 1);
    }
}
