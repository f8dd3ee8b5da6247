//! Terminal failures of a supervised operation.

use std::time::Duration;

use alo_core::{codes, ResponseFailure};

/// Terminal result of a supervised operation.
pub type Outcome = Result<Vec<u8>, AloFailure>;

/// Why a supervised operation ended without a success payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AloFailure {
    /// The work unit itself failed.
    #[error(transparent)]
    Application(ResponseFailure),
    /// The work unit never reported itself started.
    #[error("ALO did not start within {after:?}")]
    OperationTimeout { after: Duration },
    /// The work unit stopped because it was cancelled.
    #[error("ALO cancelled")]
    Cancelled,
    #[error("ALO failed internally: {0}")]
    Internal(String),
}

impl AloFailure {
    /// The failure handed to waiters and to the completion callback.
    #[must_use]
    pub fn to_response_failure(&self) -> ResponseFailure {
        let code = match self {
            Self::Application(failure) => return failure.clone(),
            Self::OperationTimeout { .. } => codes::DEADLINE_EXCEEDED,
            Self::Cancelled => codes::CANCELLED,
            Self::Internal(_) => codes::INTERNAL,
        };
        ResponseFailure::with_message(code, self.to_string())
    }
}

impl From<ResponseFailure> for AloFailure {
    fn from(failure: ResponseFailure) -> Self {
        Self::Application(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_translates_to_deadline_exceeded() {
        let failure = AloFailure::OperationTimeout {
            after: Duration::from_secs(30),
        }
        .to_response_failure();
        assert_eq!(failure.code, codes::DEADLINE_EXCEEDED);
        assert_eq!(failure.message(), "ALO did not start within 30s");
    }

    #[test]
    fn application_failure_is_unchanged() {
        let original = ResponseFailure::with_message(42, "insufficient funds");
        let translated = AloFailure::from(original.clone()).to_response_failure();
        assert_eq!(translated, original);
    }

    #[test]
    fn cancelled_and_internal_codes() {
        assert_eq!(
            AloFailure::Cancelled.to_response_failure().code,
            codes::CANCELLED
        );
        assert_eq!(
            AloFailure::Internal("boom".into()).to_response_failure().code,
            codes::INTERNAL
        );
    }
}
