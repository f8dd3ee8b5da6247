//! Asynchronous long-running operations.
//!
//! 1. **State** (`state`): pure supervisor transition function with replay
//! 2. **Supervisor** (`supervisor`): one tokio task per operation driving the
//!    state machine
//! 3. **Work units** (`work_unit`, `adapter`): the computation contract and an
//!    adapter for plain async functions
//! 4. **Host** (`host`, `liveness`): owns supervisors by ALO id, serves the
//!    ALO handler contract, sweeps heartbeats and archived operations
//! 5. **Callbacks** (`callback`): best-effort completion notification seam

pub mod adapter;
pub mod callback;
pub mod config;
pub mod failure;
pub mod host;
pub mod liveness;
pub mod state;
pub mod supervisor;
pub mod work_unit;

pub use adapter::TaskAdapter;
pub use callback::{CallbackError, CallbackInvoker, Completion, LoggingInvoker};
pub use config::{AdapterConfig, AloHostConfig, SupervisorConfig};
pub use failure::{AloFailure, Outcome};
pub use host::AloHost;
pub use liveness::{HeartbeatMonitor, LivenessSweeper};
pub use state::{Effect, Event, Phase, SupervisorState};
pub use supervisor::{Supervisor, SupervisorHandle};
pub use work_unit::{work_unit_fn, WorkUnit, WorkUnitContext, WorkUnitFn};
