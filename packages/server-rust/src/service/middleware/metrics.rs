//! Call instrumentation middleware.
//!
//! Records call duration and outcome using `tracing` spans and events.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use alo_core::{Request, Response};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::OperationError;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments calls with timing and outcome via `tracing` spans.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Request> for MetricsService<S>
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
        let span = info_span!(
            "call",
            service = %req.service,
            operation = %req.operation,
            request_id = %req.request_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = match &result {
                    Ok(resp) if resp.alo_info => "alo_info",
                    Ok(_) => "ok",
                    Err(OperationError::Application(_)) => "application_failure",
                    Err(_) => "error",
                };

                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                match &result {
                    Err(err) if !matches!(err, OperationError::Application(_)) => {
                        tracing::warn!(duration_ms, code = err.code(), error = %err, "call failed");
                    }
                    _ => tracing::debug!(duration_ms, outcome, "call complete"),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
