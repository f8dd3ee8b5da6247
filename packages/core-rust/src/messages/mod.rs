//! Wire-compatible message shapes for the ALO RPC protocol.
//!
//! All types serialize as named `MsgPack` maps (`rmp_serde::to_vec_named()`)
//! with camelCase field names; byte payloads use `serde_bytes` so they travel
//! as `MsgPack` binary rather than integer arrays.

pub mod alo;
pub mod base;
pub mod envelope;

pub use alo::{AloInfo, AloRef, AloStatus, SubOperation};
pub use base::{HttpCallback, Metadata, Request, Response, ResponseFailure};
pub use envelope::{CallResponse, CallResult, ResponseType};
