//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::config::ServerConfig;
use crate::service::router::OperationRouter;

/// The fully layered dispatch service.
///
/// Concrete rather than boxed so the pipeline stays `Clone + Send + Sync` and
/// can be shared by every connection.
pub type DispatchPipeline = LoadShedService<TimeoutService<MetricsService<OperationRouter>>>;

/// Build the dispatch pipeline by wrapping the `OperationRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce the caller's deadline, if one was sent
/// 3. `MetricsLayer` -- record timing and outcome (closest to the actual handler)
#[must_use]
pub fn build_dispatch_pipeline(router: OperationRouter, config: &ServerConfig) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_calls))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use alo_core::{Request, Response};
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::{OperationError, REQUEST_TIMEOUT_METADATA};
    use crate::traits::handler_fn;

    fn router() -> OperationRouter {
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
        router
            .register(
                "svc",
                "stall",
                handler_fn(|_req: Request| async move {
                    std::future::pending::<()>().await;
                    Ok::<_, OperationError>(Response::empty())
                }),
            )
            .unwrap();
        router
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let config = ServerConfig {
            max_concurrent_calls: 100,
            ..ServerConfig::default()
        };

        let svc = build_dispatch_pipeline(router(), &config);
        let req = Request::new("r1", "svc", "echo").with_input(b"hi".to_vec());
        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.output, b"hi");
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_applies_caller_deadline() {
        let svc = build_dispatch_pipeline(router(), &ServerConfig::default());
        let req = Request::new("r1", "svc", "stall").with_metadata(REQUEST_TIMEOUT_METADATA, "25");
        let err = svc.oneshot(req).await.unwrap_err();
        assert!(matches!(err, OperationError::DeadlineExceeded { timeout_ms: 25 }));
    }

    #[tokio::test]
    async fn pipeline_reports_unknown_operation() {
        let svc = build_dispatch_pipeline(router(), &ServerConfig::default());
        let err = svc
            .oneshot(Request::new("r1", "other", "echo"))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation { .. }));
    }
}
