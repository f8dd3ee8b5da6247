//! ALO RPC Server: call dispatch, asynchronous long-running operations
//! (ALOs), the RPC client and the HTTP binding.
//!
//! A worker process builds an [`OperationRouter`], registers plain
//! [`Handler`]s and ALO work units (through an [`AloHost`]), freezes the
//! router into a [`Dispatcher`] and serves it over HTTP with a
//! [`NetworkModule`]. Callers use a [`Client`] over any [`Transport`].

pub mod alo;
pub mod client;
pub mod network;
pub mod service;
pub mod traits;

pub use alo::{AloFailure, AloHost, AloHostConfig, TaskAdapter, WorkUnit, WorkUnitContext};
pub use client::{AloHandle, Client, ClientError, LocalTransport, TransportError};
pub use network::{HttpTransport, NetworkConfig, NetworkModule};
pub use service::{Dispatcher, OperationError, OperationRouter, ServerConfig};
pub use traits::{handler_fn, AloHandler, Handler, Transport};
