//! Failure codes used for framework-generated `ResponseFailure` values.
//!
//! Application handlers may use any `u32` code; these values are reserved for
//! failures produced by the dispatcher and the supervisor itself. The numbering
//! follows the familiar gRPC status space so callers can branch on it.

/// The operation was cancelled before it produced a result.
pub const CANCELLED: u32 = 1;
/// The request input (e.g. an ALO reference) could not be decoded.
pub const INVALID_ARGUMENT: u32 = 3;
/// A deadline expired: the caller's call deadline or an ALO start deadline.
pub const DEADLINE_EXCEEDED: u32 = 4;
/// The referenced ALO is unknown to the handler.
pub const NOT_FOUND: u32 = 5;
/// The dispatcher is shedding load.
pub const RESOURCE_EXHAUSTED: u32 = 8;
/// No handler is registered for the (service, operation) pair.
pub const UNIMPLEMENTED: u32 = 12;
/// Unexpected handler or supervisor failure.
pub const INTERNAL: u32 = 13;
