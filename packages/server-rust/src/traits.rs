use std::future::Future;

use alo_core::{AloInfo, AloRef, Request, Response};
use async_trait::async_trait;
use bytes::Bytes;

use crate::client::TransportError;
use crate::service::OperationError;

/// Handles calls for a single `(service, operation)` binding.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Serve one request.
    async fn serve(&self, req: Request) -> Result<Response, OperationError>;
}

/// Handler for an asynchronous long-running operation.
///
/// Registering one with the router binds four operations: the base name
/// (start), `/get`, `/cancel` and `/wait`. The router decodes the `AloRef`
/// from the request input before calling the get/cancel/wait methods.
#[async_trait]
pub trait AloHandler: Send + Sync {
    /// Start the operation described by `req`. The returned snapshot's `id`
    /// becomes the ALO id used by subsequent calls.
    async fn start(&self, req: Request) -> Result<AloInfo, OperationError>;

    /// Current snapshot of the operation.
    async fn info(&self, alo: &AloRef) -> Result<AloInfo, OperationError>;

    /// Request cancellation. Advisory and idempotent.
    async fn cancel(&self, alo: &AloRef) -> Result<(), OperationError>;

    /// Block until the operation has a terminal result and return it.
    async fn wait(&self, alo: &AloRef) -> Result<Response, OperationError>;
}

/// Moves encoded call envelopes between a client and a dispatcher.
///
/// Implementations must be safe to invoke concurrently from many tasks
/// without external locking.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an encoded `Request` and return the encoded `CallResponse`.
    async fn call(&self, body: Bytes) -> Result<Bytes, TransportError>;

    /// Release transport resources. Default is a no-op.
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Adapter turning an async closure into a [`Handler`].
pub struct HandlerFn<F>(F);

/// Wrap `f` as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, OperationError>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, OperationError>> + Send + 'static,
{
    async fn serve(&self, req: Request) -> Result<Response, OperationError> {
        (self.0)(req).await
    }
}
