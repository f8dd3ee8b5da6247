//! Caller-deadline middleware.
//!
//! Enforces the deadline a caller attaches through the `request-timeout-ms`
//! metadata entry, failing the call with `OperationError::DeadlineExceeded`.
//! Calls without the entry (or with an unparsable value) run unbounded, which
//! is what long `/wait` calls rely on.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use alo_core::{Request, Response};
use tower::{Layer, Service};

use crate::service::operation::{OperationError, REQUEST_TIMEOUT_METADATA};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-call deadline enforcement.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces caller-supplied deadlines.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

fn caller_timeout_ms(req: &Request) -> Option<u64> {
    req.metadata_value(REQUEST_TIMEOUT_METADATA)?.trim().parse().ok()
}

impl<S> Service<Request> for TimeoutService<S>
where
    S: Service<Request, Response = Response, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let timeout_ms = caller_timeout_ms(&req);
        let fut = self.inner.call(req);
        Box::pin(async move {
            let Some(timeout_ms) = timeout_ms else {
                return fut.await;
            };
            match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(OperationError::DeadlineExceeded { timeout_ms }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;

    /// Service that takes a configurable delay before responding.
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<Request> for SlowService {
        type Response = Response;
        type Error = OperationError;
        type Future = Pin<Box<dyn Future<Output = Result<Response, OperationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Response::empty())
            })
        }
    }

    fn make_req(timeout_ms: Option<&str>) -> Request {
        let req = Request::new("r1", "svc", "op");
        match timeout_ms {
            Some(ms) => req.with_metadata(REQUEST_TIMEOUT_METADATA, ms),
            None => req,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_timeout() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 10 });
        let resp = svc.oneshot(make_req(Some("1000"))).await.unwrap();
        assert_eq!(resp, Response::empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exceeds_timeout_returns_error() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(make_req(Some("50"))).await.unwrap_err();
        assert!(matches!(err, OperationError::DeadlineExceeded { timeout_ms: 50 }));
    }

    #[tokio::test(start_paused = true)]
    async fn no_deadline_runs_unbounded() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 120_000 });
        assert!(svc.oneshot(make_req(None)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unparsable_deadline_is_ignored() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 100 });
        assert!(svc.oneshot(make_req(Some("soon"))).await.is_ok());
    }
}
