//! Shared entry point that turns encoded call envelopes into encoded answers.

use alo_core::{CallResponse, CodecError, Request, Response};
use tower::ServiceExt;

use super::config::ServerConfig;
use super::middleware::{build_dispatch_pipeline, DispatchPipeline};
use super::operation::OperationError;
use super::router::OperationRouter;

/// Serves calls through the middleware pipeline around a frozen router.
///
/// Cheap to clone; every transport binding holds one.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: DispatchPipeline,
}

impl Dispatcher {
    /// Freeze `router` and wrap it in the middleware pipeline.
    #[must_use]
    pub fn new(router: OperationRouter, config: &ServerConfig) -> Self {
        Self {
            pipeline: build_dispatch_pipeline(router, config),
        }
    }

    /// Serve one decoded request.
    ///
    /// # Errors
    ///
    /// Returns whatever `OperationError` the pipeline or handler produced.
    pub async fn dispatch(&self, req: Request) -> Result<Response, OperationError> {
        self.pipeline.clone().oneshot(req).await
    }

    /// Serve one encoded request and return the encoded `CallResponse`.
    ///
    /// Decode failures and handler errors are answered with failure envelopes,
    /// so the caller always receives a well-formed reply.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` only if the reply itself cannot be encoded.
    pub async fn dispatch_encoded(&self, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        let envelope: CallResponse = match Request::from_bytes(body) {
            Ok(req) => self
                .dispatch(req)
                .await
                .map_err(OperationError::into_failure)
                .into(),
            Err(err) => OperationError::from(err).into_failure().into(),
        };
        envelope.to_bytes()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use alo_core::codes;

    use super::*;
    use crate::traits::handler_fn;

    fn dispatcher() -> Dispatcher {
        let mut router = OperationRouter::new();
        router
            .register(
                "svc",
                "echo",
                handler_fn(|req: Request| async move {
                    Ok::<_, OperationError>(Response::output(req.input))
                }),
            )
            .unwrap();
        Dispatcher::new(router, &ServerConfig::default())
    }

    #[tokio::test]
    async fn encoded_success_roundtrip() {
        let req = Request::new("r1", "svc", "echo").with_input(b"x".to_vec());
        let reply = dispatcher()
            .dispatch_encoded(&req.to_bytes().unwrap())
            .await
            .unwrap();
        let resp = CallResponse::from_bytes(&reply).unwrap().into_result().unwrap();
        assert_eq!(resp.output, b"x");
    }

    #[tokio::test]
    async fn garbage_request_gets_invalid_argument() {
        let reply = dispatcher().dispatch_encoded(b"\xc1garbage").await.unwrap();
        let failure = CallResponse::from_bytes(&reply)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!(failure.code, codes::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn unknown_operation_gets_unimplemented() {
        let req = Request::new("r1", "svc", "nope");
        let reply = dispatcher()
            .dispatch_encoded(&req.to_bytes().unwrap())
            .await
            .unwrap();
        let failure = CallResponse::from_bytes(&reply)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!(failure.code, codes::UNIMPLEMENTED);
    }
}
