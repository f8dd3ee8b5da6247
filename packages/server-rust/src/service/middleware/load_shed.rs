//! Load-shedding middleware for calls.
//!
//! Rejects calls when the dispatcher is overloaded (concurrent count exceeds
//! `max_concurrent_calls`) with `OperationError::Overloaded`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use alo_core::{Request, Response};
use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::operation::OperationError;

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent calls via a semaphore.
///
/// When all permits are taken, incoming calls are rejected immediately
/// with `OperationError::Overloaded` rather than queued.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    /// Create a new `LoadShedLayer` with the given concurrency limit.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: self.semaphore.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces a concurrency limit via semaphore-based backpressure.
#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<Request> for LoadShedService<S>
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
        // Try to acquire a permit without waiting. If none available, reject.
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            return Box::pin(async { Err(OperationError::Overloaded) });
        };

        let fut = self.inner.call(req);
        Box::pin(async move {
            // Hold the permit for the duration of the call.
            let result = fut.await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;

    /// Service that holds for a configurable duration.
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

    fn make_req() -> Request {
        Request::new("r1", "svc", "op")
    }

    #[tokio::test]
    async fn allows_calls_under_limit() {
        let layer = LoadShedLayer::new(10);
        let svc = layer.layer(SlowService { delay_ms: 1 });
        let resp = svc.oneshot(make_req()).await.unwrap();
        assert_eq!(resp, Response::empty());
    }

    #[tokio::test]
    async fn rejects_when_overloaded() {
        let layer = LoadShedLayer::new(1);
        let mut svc = layer.layer(SlowService { delay_ms: 500 });

        // First call acquires the single permit as soon as it is issued.
        let _ = ServiceExt::ready(&mut svc).await.unwrap();
        let in_flight = svc.call(make_req());

        // Second call is rejected immediately.
        let err = svc.call(make_req()).await.unwrap_err();
        assert!(matches!(err, OperationError::Overloaded));

        // Once the first finishes the permit is available again.
        in_flight.await.unwrap();
        assert!(svc.call(make_req()).await.is_ok());
    }
}
