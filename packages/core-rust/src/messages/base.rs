//! Base request/response types shared by every call.
//!
//! `Request` is also the wire shape of a call: it is serialized as a named
//! `MsgPack` map with camelCase field names via `rmp_serde::to_vec_named()`.
//! `Response` and `ResponseFailure` are the decoded halves of a
//! [`CallResponse`](super::envelope::CallResponse).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{decode, encode, CodecError};

/// Multi-valued call metadata: each key maps to an ordered list of values.
pub type Metadata = HashMap<String, Vec<String>>;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Target for an out-of-band completion notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCallback {
    pub url: String,
}

/// A single call addressed to `(service, operation)`.
///
/// `request_id` is unique per call attempt. For ALO starts it doubles as the
/// idempotency key and becomes the operation's ALO id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_id: String,
    pub service: String,
    pub operation: String,
    #[serde(with = "serde_bytes", default)]
    pub input: Vec<u8>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub http_callback: Option<HttpCallback>,
}

impl Request {
    /// Creates a request with empty input and metadata.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        service: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            service: service.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Sets the opaque input payload.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = input.into();
        self
    }

    /// Appends a metadata value under `key`.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Requests a completion callback to `url` once the ALO finishes.
    #[must_use]
    pub fn with_http_callback(mut self, url: impl Into<String>) -> Self {
        self.http_callback = Some(HttpCallback { url: url.into() });
        self
    }

    /// Returns the first metadata value stored under `key`.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Encodes the request as a call envelope body.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode("request", self)
    }

    /// Decodes a call envelope body.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` for malformed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        decode("request", bytes)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Successful call result.
///
/// When `alo_info` is set, `output` holds an encoded [`AloInfo`](super::AloInfo)
/// rather than application data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub output: Vec<u8>,
    pub alo_info: bool,
    pub metadata: Metadata,
}

impl Response {
    /// A plain application response.
    #[must_use]
    pub fn output(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    /// An empty response (e.g. for a cancel call).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// ResponseFailure
// ---------------------------------------------------------------------------

/// Application-level failure returned by the callee.
///
/// Distinct from transport failures: the call itself was delivered and
/// answered, but the callee reported `code` with opaque detail in `output`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseFailure {
    pub code: u32,
    pub output: Vec<u8>,
    pub metadata: Metadata,
}

impl ResponseFailure {
    /// Builds a failure whose detail is a UTF-8 message.
    #[must_use]
    pub fn with_message(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            output: message.into().into_bytes(),
            metadata: Metadata::new(),
        }
    }

    /// Interprets the detail as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl fmt::Display for ResponseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request failure with code {}", self.code)
    }
}

impl std::error::Error for ResponseFailure {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
