//! Asynchronous long-running operation (ALO) references, snapshots, and
//! sub-operation addressing.
//!
//! An ALO registered at operation `X` is driven through four routed
//! operations: `X` (start), `X/get`, `X/cancel` and `X/wait`. The suffix is the
//! only multiplexing mechanism, so the suffix segments are reserved and user
//! operation names must not contain them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::base::Request;
use crate::error::{decode, encode, CodecError};

// ---------------------------------------------------------------------------
// AloStatus
// ---------------------------------------------------------------------------

/// Lifecycle status reported in an [`AloInfo`] snapshot.
///
/// Variants are ordered by lifecycle progress; status never moves backwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AloStatus {
    #[default]
    Unspecified,
    Running,
    Completed,
}

impl AloStatus {
    /// Returns the later of `self` and `next`.
    #[must_use]
    pub fn advance(self, next: Self) -> Self {
        self.max(next)
    }

    /// Returns `true` once the operation has a terminal result.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

// ---------------------------------------------------------------------------
// AloInfo
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of an ALO.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AloInfo {
    pub id: String,
    #[serde(default)]
    pub status: AloStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl AloInfo {
    /// A snapshot with no metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, status: AloStatus) -> Self {
        Self {
            id: id.into(),
            status,
            metadata: HashMap::new(),
        }
    }

    /// Shorthand for a `RUNNING` snapshot.
    #[must_use]
    pub fn running(id: impl Into<String>) -> Self {
        Self::new(id, AloStatus::Running)
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Encodes the snapshot for a `Response` with the `alo_info` flag set.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode("ALO info", self)
    }

    /// Decodes a snapshot from a response's output.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` for malformed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        decode("ALO info", bytes)
    }
}

// ---------------------------------------------------------------------------
// AloRef
// ---------------------------------------------------------------------------

/// Identity of one ALO.
///
/// Only `id` crosses the wire for get/cancel/wait calls; `service` and
/// `operation` (the base operation, without suffix) are carried by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AloRef {
    pub service: String,
    pub operation: String,
    pub id: String,
}

/// Wire form of an [`AloRef`].
#[derive(Debug, Serialize, Deserialize)]
struct AloRefWire {
    id: String,
}

impl AloRef {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            id: id.into(),
        }
    }

    /// Encodes the identity sent as the input of a sub-operation call.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode("ALO reference", &AloRefWire { id: self.id.clone() })
    }

    /// Rebuilds a reference from a sub-operation request.
    ///
    /// The identity is decoded from `req.input`; service and base operation come
    /// from the request's routing fields.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if the input is not an encoded reference.
    pub fn from_request(req: &Request) -> Result<Self, CodecError> {
        let wire: AloRefWire = decode("ALO reference", &req.input)?;
        let (base, _) = SubOperation::split(&req.operation);
        Ok(Self {
            service: req.service.clone(),
            operation: base.to_string(),
            id: wire.id,
        })
    }
}

// ---------------------------------------------------------------------------
// SubOperation
// ---------------------------------------------------------------------------

/// The four routed operations an ALO is exposed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubOperation {
    Start,
    GetInfo,
    Cancel,
    Wait,
}

impl SubOperation {
    /// All sub-operations, start first.
    pub const ALL: [Self; 4] = [Self::Start, Self::GetInfo, Self::Cancel, Self::Wait];

    /// Operation-name suffix appended to the base operation.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Start => "",
            Self::GetInfo => "/get",
            Self::Cancel => "/cancel",
            Self::Wait => "/wait",
        }
    }

    /// Full operation name for this sub-operation of `base`.
    #[must_use]
    pub fn address(self, base: &str) -> String {
        format!("{base}{}", self.suffix())
    }

    /// Splits a routed operation name into its base and sub-operation.
    ///
    /// Names without a reserved suffix are `Start` calls of themselves.
    #[must_use]
    pub fn split(operation: &str) -> (&str, Self) {
        for sub in [Self::GetInfo, Self::Cancel, Self::Wait] {
            if let Some(base) = operation.strip_suffix(sub.suffix()) {
                return (base, sub);
            }
        }
        (operation, Self::Start)
    }

    /// Returns `true` if `name` contains a reserved suffix segment and could
    /// therefore collide with a generated sub-operation.
    #[must_use]
    pub fn is_reserved_name(name: &str) -> bool {
        name.split('/')
            .skip(1)
            .any(|segment| matches!(segment, "get" | "cancel" | "wait"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
