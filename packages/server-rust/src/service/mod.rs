//! Call routing and dispatch framework.
//!
//! This module implements the server side of the protocol:
//!
//! 1. **Routing** (`router`): `(service, operation)` -> handler, with ALO
//!    handlers expanded into their four sub-operations
//! 2. **Middleware** (`middleware`): Tower layers (load shedding, caller
//!    deadline, call tracing)
//! 3. **Dispatch** (`dispatcher`): encoded envelope in, encoded envelope out
//! 4. **Background workers** (`worker`): Periodic tasks (liveness sweeps)

pub mod config;
pub mod dispatcher;
pub mod middleware;
pub mod operation;
pub mod router;
pub mod worker;

// Re-export key types for convenient access.
pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use operation::{OperationError, REQUEST_TIMEOUT_METADATA};
pub use router::{OperationRouter, RegistrationError};
pub use worker::{BackgroundRunnable, BackgroundWorker};
