//! Timing knobs for supervisors, adapters and the supervisor host.

use std::time::Duration;

/// Per-operation supervisor timing.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long the work unit has to report itself started.
    pub start_timeout: Duration,
    /// Upper bound on one completion callback attempt.
    pub callback_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            callback_timeout: Duration::from_secs(20),
        }
    }
}

/// Settings for [`TaskAdapter`](super::TaskAdapter).
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Interval between heartbeats while the wrapped computation runs.
    pub heartbeat_interval: Duration,
    /// How long the computation may keep running after cancellation was
    /// forwarded before the adapter gives up on it.
    pub cancel_grace: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            cancel_grace: Duration::from_secs(5),
        }
    }
}

/// Settings for [`AloHost`](super::AloHost).
#[derive(Debug, Clone)]
pub struct AloHostConfig {
    /// Timing applied to every supervisor the host spawns.
    pub supervisor: SupervisorConfig,
    /// A running operation without a heartbeat for this long is reported as
    /// stalled.
    pub heartbeat_timeout: Duration,
    /// How long completed operations stay queryable before eviction.
    pub completed_retention: Duration,
    /// Interval of the liveness sweep.
    pub sweep_interval: Duration,
}

impl Default for AloHostConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            heartbeat_timeout: Duration::from_secs(10),
            completed_retention: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(1),
        }
    }
}
