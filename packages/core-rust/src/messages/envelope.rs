//! Call response envelope.
//!
//! A call is answered by exactly one `CallResponse`, which carries either a
//! success (plain output or an encoded ALO snapshot) or an application
//! failure. Transports move these bytes verbatim.

use serde::{Deserialize, Serialize};

use super::base::{Metadata, Response, ResponseFailure};
use crate::error::{decode, encode, CodecError};

/// Kind of a successful call's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    #[default]
    Output,
    AloInfo,
}

/// Success-or-failure body of a [`CallResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallResult {
    Success {
        #[serde(with = "serde_bytes")]
        output: Vec<u8>,
        #[serde(rename = "responseType", default)]
        response_type: ResponseType,
    },
    Failure {
        code: u32,
        #[serde(with = "serde_bytes")]
        output: Vec<u8>,
    },
}

/// Wire answer to a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    #[serde(skip_serializing_if = "Metadata::is_empty", default)]
    pub metadata: Metadata,
    pub result: CallResult,
}

impl CallResponse {
    /// Encodes the envelope.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode("call response", self)
    }

    /// Decodes an envelope.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` for malformed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        decode("call response", bytes)
    }

    /// Splits the envelope into a `Response` or a `ResponseFailure`.
    ///
    /// # Errors
    ///
    /// Returns the callee's `ResponseFailure` for a failure envelope.
    pub fn into_result(self) -> Result<Response, ResponseFailure> {
        match self.result {
            CallResult::Success {
                output,
                response_type,
            } => Ok(Response {
                output,
                alo_info: response_type == ResponseType::AloInfo,
                metadata: self.metadata,
            }),
            CallResult::Failure { code, output } => Err(ResponseFailure {
                code,
                output,
                metadata: self.metadata,
            }),
        }
    }
}

impl From<Response> for CallResponse {
    fn from(resp: Response) -> Self {
        let response_type = if resp.alo_info {
            ResponseType::AloInfo
        } else {
            ResponseType::Output
        };
        Self {
            metadata: resp.metadata,
            result: CallResult::Success {
                output: resp.output,
                response_type,
            },
        }
    }
}

impl From<ResponseFailure> for CallResponse {
    fn from(failure: ResponseFailure) -> Self {
        Self {
            metadata: failure.metadata,
            result: CallResult::Failure {
                code: failure.code,
                output: failure.output,
            },
        }
    }
}

impl From<Result<Response, ResponseFailure>> for CallResponse {
    fn from(result: Result<Response, ResponseFailure>) -> Self {
        match result {
            Ok(resp) => resp.into(),
            Err(failure) => failure.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::AloInfo;

    fn roundtrip(envelope: &CallResponse) -> CallResponse {
        CallResponse::from_bytes(&envelope.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn alo_info_flag_survives_the_wire() {
        let info = AloInfo::running("r1");
        let resp = Response {
            output: info.to_bytes().unwrap(),
            alo_info: true,
            metadata: Metadata::new(),
        };

        let decoded = roundtrip(&CallResponse::from(resp.clone()))
            .into_result()
            .unwrap();
        assert_eq!(decoded, resp);
        assert_eq!(AloInfo::from_bytes(&decoded.output).unwrap(), info);
    }

    #[test]
    fn plain_output_has_flag_cleared() {
        let resp = Response::output(b"hello".to_vec());
        let decoded = roundtrip(&resp.into()).into_result().unwrap();
        assert!(!decoded.alo_info);
        assert_eq!(decoded.output, b"hello");
    }

    #[test]
    fn failure_keeps_code_detail_and_metadata() {
        let mut failure = ResponseFailure::with_message(42, "boom");
        failure
            .metadata
            .insert("retry".to_string(), vec!["no".to_string()]);

        let err = roundtrip(&failure.clone().into()).into_result().unwrap_err();
        assert_eq!(err, failure);
    }

    #[test]
    fn missing_response_type_defaults_to_output() {
        #[derive(Serialize)]
        struct Legacy {
            result: LegacySuccess,
        }
        #[derive(Serialize)]
        struct LegacySuccess {
            #[serde(rename = "type")]
            kind: &'static str,
            #[serde(with = "serde_bytes")]
            output: Vec<u8>,
        }

        let bytes = rmp_serde::to_vec_named(&Legacy {
            result: LegacySuccess {
                kind: "SUCCESS",
                output: b"x".to_vec(),
            },
        })
        .unwrap();
        let resp = CallResponse::from_bytes(&bytes).unwrap().into_result().unwrap();
        assert!(!resp.alo_info);
        assert_eq!(resp.output, b"x");
    }
}
