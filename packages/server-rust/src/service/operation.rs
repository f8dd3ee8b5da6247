//! Dispatcher error taxonomy and its mapping onto wire failures.

use alo_core::{codes, CodecError, ResponseFailure};

/// Metadata key a caller uses to bound how long the dispatcher may spend on a
/// call, in milliseconds.
pub const REQUEST_TIMEOUT_METADATA: &str = "request-timeout-ms";

/// Errors returned by handlers and the dispatch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("no handler registered for {service}/{operation}")]
    UnknownOperation { service: String, operation: String },
    #[error(transparent)]
    Decode(#[from] CodecError),
    #[error("ALO not found: {id}")]
    NotFound { id: String },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("call exceeded caller deadline of {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },
    #[error(transparent)]
    Application(#[from] ResponseFailure),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Wire failure code for this error.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::UnknownOperation { .. } => codes::UNIMPLEMENTED,
            Self::Decode(_) => codes::INVALID_ARGUMENT,
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::Overloaded => codes::RESOURCE_EXHAUSTED,
            Self::DeadlineExceeded { .. } => codes::DEADLINE_EXCEEDED,
            Self::Application(failure) => failure.code,
            Self::Internal(_) => codes::INTERNAL,
        }
    }

    /// Translate into the `ResponseFailure` sent back to the caller.
    ///
    /// Application failures pass through untouched; every other variant
    /// carries its display text as the failure detail.
    #[must_use]
    pub fn into_failure(self) -> ResponseFailure {
        match self {
            Self::Application(failure) => failure,
            other => ResponseFailure::with_message(other.code(), other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
