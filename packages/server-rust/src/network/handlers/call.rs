//! `POST /call`: one `MsgPack` call envelope in, one out.
//!
//! Application failures travel inside a `200 OK` body as a failure envelope.
//! Non-2xx statuses are reserved for transport-level problems.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use super::AppState;
use crate::network::HealthState;

/// Content type of call envelopes.
pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

pub async fn call_handler(State(state): State<AppState>, body: Bytes) -> Response {
    if state.shutdown.health_state() != HealthState::Ready {
        return (StatusCode::SERVICE_UNAVAILABLE, "not accepting calls").into_response();
    }
    let _guard = state.shutdown.in_flight_guard();

    match state.dispatcher.dispatch_encoded(&body).await {
        Ok(reply) => ([(header::CONTENT_TYPE, MSGPACK_CONTENT_TYPE)], reply).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode call response");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
