//! Calling side of the protocol.
//!
//! [`Client`] turns requests into encoded call envelopes, sends them over a
//! shared [`Transport`] and decodes the answer. ALO sub-operations are plain
//! calls addressed by suffix (`X/get`, `X/cancel`, `X/wait`) with the encoded
//! [`AloRef`] as input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alo_core::{
    AloInfo, AloRef, CallResponse, CodecError, Request, Response, ResponseFailure, SubOperation,
};
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::service::Dispatcher;
use crate::traits::Transport;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to move bytes between client and dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with HTTP status {0}")]
    Status(u16),
    #[error("local dispatch failed: {0}")]
    Local(#[source] CodecError),
}

/// Errors returned by [`Client`] calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The answer was well-formed but not what the call requires.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error(transparent)]
    Decode(#[from] CodecError),
    /// The callee reported a failure.
    #[error(transparent)]
    Application(#[from] ResponseFailure),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// RPC client. Cheap to clone; clones share one transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    #[must_use]
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    #[must_use]
    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// One request/response exchange.
    ///
    /// # Errors
    ///
    /// `Transport` if the bytes could not be exchanged, `Decode` for a
    /// malformed answer, `Application` when the callee answered with a failure.
    pub async fn call(&self, req: Request) -> Result<Response, ClientError> {
        tracing::debug!(
            request_id = %req.request_id,
            service = %req.service,
            operation = %req.operation,
            "calling"
        );
        let body = Bytes::from(req.to_bytes()?);
        let reply = self.transport.call(body).await?;
        Ok(CallResponse::from_bytes(&reply)?.into_result()?)
    }

    /// Start an ALO and return its reference and first snapshot.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus `ProtocolViolation` if the answer is not
    /// an ALO snapshot.
    pub async fn start_alo(&self, req: Request) -> Result<(AloRef, AloInfo), ClientError> {
        let service = req.service.clone();
        let operation = req.operation.clone();
        let resp = self.call(req).await?;
        let info = expect_info(&resp)?;
        let alo = AloRef::new(service, operation, info.id.clone());
        Ok((alo, info))
    }

    /// Like [`start_alo`](Self::start_alo), returning a handle bound to this
    /// client.
    ///
    /// # Errors
    ///
    /// As [`start_alo`](Self::start_alo).
    pub async fn start(&self, req: Request) -> Result<(AloHandle, AloInfo), ClientError> {
        let (alo, info) = self.start_alo(req).await?;
        Ok((self.handle(alo), info))
    }

    /// A handle for an ALO started elsewhere.
    #[must_use]
    pub fn handle(&self, alo: AloRef) -> AloHandle {
        AloHandle {
            client: self.clone(),
            alo,
        }
    }

    /// Current snapshot of `alo`.
    ///
    /// # Errors
    ///
    /// As [`start_alo`](Self::start_alo).
    pub async fn get_alo_info(&self, alo: &AloRef) -> Result<AloInfo, ClientError> {
        let resp = self.call(sub_request(alo, SubOperation::GetInfo)?).await?;
        expect_info(&resp)
    }

    /// Ask `alo` to cancel.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call).
    pub async fn cancel_alo(&self, alo: &AloRef) -> Result<(), ClientError> {
        self.call(sub_request(alo, SubOperation::Cancel)?).await?;
        Ok(())
    }

    /// Block until `alo` has a terminal result.
    ///
    /// The HTTP binding puts no deadline on this exchange. To bound the wait,
    /// set the `request-timeout-ms` metadata entry on a request sent through
    /// [`call`](Self::call), or wrap this future in `tokio::time::timeout`.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call); a failed operation surfaces as `Application`.
    pub async fn wait_alo(&self, alo: &AloRef) -> Result<Response, ClientError> {
        self.call(sub_request(alo, SubOperation::Wait)?).await
    }

    /// Release the transport.
    ///
    /// # Errors
    ///
    /// Whatever the transport reports while closing.
    pub async fn close(&self) -> Result<(), ClientError> {
        Ok(self.transport.close().await?)
    }
}

fn sub_request(alo: &AloRef, sub: SubOperation) -> Result<Request, CodecError> {
    Ok(Request::new(
        Uuid::new_v4().to_string(),
        alo.service.clone(),
        sub.address(&alo.operation),
    )
    .with_input(alo.to_bytes()?))
}

fn expect_info(resp: &Response) -> Result<AloInfo, ClientError> {
    if !resp.alo_info {
        return Err(ClientError::ProtocolViolation(
            "expected ALO info in response".to_string(),
        ));
    }
    Ok(AloInfo::from_bytes(&resp.output)?)
}

// ---------------------------------------------------------------------------
// AloHandle
// ---------------------------------------------------------------------------

/// A client bound to one ALO.
#[derive(Clone)]
pub struct AloHandle {
    client: Client,
    alo: AloRef,
}

impl AloHandle {
    #[must_use]
    pub fn alo_ref(&self) -> &AloRef {
        &self.alo
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.alo.id
    }

    /// # Errors
    ///
    /// As [`Client::get_alo_info`].
    pub async fn info(&self) -> Result<AloInfo, ClientError> {
        self.client.get_alo_info(&self.alo).await
    }

    /// # Errors
    ///
    /// As [`Client::cancel_alo`].
    pub async fn cancel(&self) -> Result<(), ClientError> {
        self.client.cancel_alo(&self.alo).await
    }

    /// # Errors
    ///
    /// As [`Client::wait_alo`].
    pub async fn wait(&self) -> Result<Response, ClientError> {
        self.client.wait_alo(&self.alo).await
    }
}

// ---------------------------------------------------------------------------
// LocalTransport
// ---------------------------------------------------------------------------

/// In-process transport handing envelopes straight to a [`Dispatcher`].
pub struct LocalTransport {
    dispatcher: Dispatcher,
    closed: AtomicBool,
}

impl LocalTransport {
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, body: Bytes) -> Result<Bytes, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let reply = self
            .dispatcher
            .dispatch_encoded(&body)
            .await
            .map_err(TransportError::Local)?;
        Ok(Bytes::from(reply))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
