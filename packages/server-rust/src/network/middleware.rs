//! HTTP middleware stack for the call binding.
//!
//! Layers are listed outermost first: the first layer sees the request first
//! on the way in and the response last on the way out.

use axum::http::header::HeaderName;
use axum::http::StatusCode;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// Composed layer type produced by [`build_http_layers`], outermost first.
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        RequestBodyLimitLayer,
        tower::layer::util::Stack<
            TraceLayer<
                tower_http::classify::SharedClassifier<
                    tower_http::classify::ServerErrorsAsFailures,
                >,
            >,
            tower::layer::util::Stack<
                SetRequestIdLayer<MakeRequestUuid>,
                tower::layer::util::Identity,
            >,
        >,
    >,
>;

/// Builds the HTTP-level middleware stack shared by every route.
///
/// **Ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID v4 `X-Request-Id`
/// 2. `Tracing` -- one span per HTTP exchange
/// 3. `RequestBodyLimit` -- rejects envelopes above `max_body_bytes` with 413
/// 4. `PropagateRequestId` -- echoes `X-Request-Id` on the response
///
/// There is no exchange timeout here: `/call` carries `/wait`, which blocks
/// for the lifetime of an ALO. Calls are bounded by the caller-deadline
/// layer of the dispatch pipeline instead; see [`build_health_timeout`].
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// Timeout for the health routes: 408 once `request_timeout` elapses.
#[must_use]
pub fn build_health_timeout(config: &NetworkConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout)
}
