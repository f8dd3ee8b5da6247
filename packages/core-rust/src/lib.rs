//! ALO RPC Core: request/response wire model, ALO references and snapshots, and `MsgPack` codecs.

pub mod codes;
pub mod error;
pub mod messages;

pub use error::CodecError;
pub use messages::{
    AloInfo, AloRef, AloStatus, CallResponse, CallResult, HttpCallback, Metadata, Request,
    Response, ResponseFailure, ResponseType, SubOperation,
};
