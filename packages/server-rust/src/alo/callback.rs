//! Completion callback seam.
//!
//! The supervisor hands the terminal result of an operation to a
//! [`CallbackInvoker`] exactly once. Delivery is best effort: errors are
//! logged and never change the operation's result.

use std::time::Duration;

use alo_core::{HttpCallback, ResponseFailure};
use async_trait::async_trait;

use super::failure::Outcome;

/// Terminal result as delivered to a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success(Vec<u8>),
    Failure(ResponseFailure),
}

impl From<&Outcome> for Completion {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Ok(output) => Self::Success(output.clone()),
            Err(failure) => Self::Failure(failure.to_response_failure()),
        }
    }
}

/// Errors from a callback attempt.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("callback to {url} failed: {reason}")]
    Delivery { url: String, reason: String },
    #[error("callback did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Delivers completion notifications.
#[async_trait]
pub trait CallbackInvoker: Send + Sync {
    async fn invoke(
        &self,
        callback: &HttpCallback,
        completion: Completion,
    ) -> Result<(), CallbackError>;
}

/// Invoker that only logs the completion it would deliver.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInvoker;

#[async_trait]
impl CallbackInvoker for LoggingInvoker {
    async fn invoke(
        &self,
        callback: &HttpCallback,
        completion: Completion,
    ) -> Result<(), CallbackError> {
        match completion {
            Completion::Success(output) => {
                tracing::info!(url = %callback.url, bytes = output.len(), "ALO completed");
            }
            Completion::Failure(failure) => {
                tracing::info!(
                    url = %callback.url,
                    code = failure.code,
                    detail = %failure.message(),
                    "ALO failed"
                );
            }
        }
        Ok(())
    }
}

/// Test invoker recording every delivery.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingInvoker {
    pub(crate) calls: parking_lot::Mutex<Vec<(String, Completion)>>,
    pub(crate) fail: bool,
    pub(crate) delay: Option<Duration>,
}

#[cfg(test)]
#[async_trait]
impl CallbackInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        callback: &HttpCallback,
        completion: Completion,
    ) -> Result<(), CallbackError> {
        self.calls.lock().push((callback.url.clone(), completion));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(CallbackError::Delivery {
                url: callback.url.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
