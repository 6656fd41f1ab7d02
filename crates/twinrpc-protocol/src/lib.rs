//! # JSON-RPC 1.0/2.0 wire protocol
//!
//! Transport-agnostic payload codec for both JSON-RPC generations. This crate
//! is the single source of truth for wire shape: it builds and parses
//! request, notification, response and error dictionaries, and classifies
//! error objects into the protocol/application failure taxonomy.
//!
//! The two generations disagree structurally (1.0 always carries a `params`
//! key and responses with both `result` and `error` members; 2.0 tags every
//! message with `"jsonrpc"` and omits what is absent), so payloads are
//! assembled as JSON value maps here rather than forced through a single
//! serde shape.

pub mod codec;
pub mod failure;
pub mod fault;
pub mod types;

pub use codec::{
    CodecError, check_for_errors, decode, encode_request, encode_response, is_batch,
    is_notification,
};
pub use failure::{RpcFailure, is_reserved_code};
pub use fault::Fault;
pub use types::{Params, RequestId, Version};

/// Wire tag carried by every JSON-RPC 2.0 message.
pub const JSONRPC_VERSION_TAG: &str = "2.0";

/// Reserved JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Implementation-defined server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
