use thiserror::Error;

use twinrpc_protocol::{CodecError, RpcFailure};

use crate::transport::TransportError;

/// Everything a call can fail with: a transport problem, a body that could
/// not be (de)serialized, or a fault the peer returned. All narrow,
/// recoverable, and never process-fatal.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A fault received from the peer, classified by code range into a
    /// protocol or application failure.
    #[error(transparent)]
    Rpc(#[from] RpcFailure),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// The fault code, when the peer answered with a fault.
    pub fn fault_code(&self) -> Option<i64> {
        match self {
            ClientError::Rpc(failure) => Some(failure.code()),
            _ => None,
        }
    }

    pub fn is_protocol_failure(&self) -> bool {
        matches!(self, ClientError::Rpc(RpcFailure::Protocol { .. }))
    }

    pub fn is_application_failure(&self) -> bool {
        matches!(self, ClientError::Rpc(RpcFailure::Application { .. }))
    }
}
