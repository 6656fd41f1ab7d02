use serde_json::Value;
use thiserror::Error;

use crate::error_codes;

/// True for error codes in the reserved protocol range [-32700, -32000].
pub fn is_reserved_code(code: i64) -> bool {
    (error_codes::PARSE_ERROR..=error_codes::SERVER_ERROR_END).contains(&code)
}

/// A structured failure surfaced to the calling side.
///
/// Faults received over the wire are split by code range: the reserved range
/// is a protocol failure, anything else is an application failure carrying
/// whatever `data` the server attached. Both are narrow, recoverable values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcFailure {
    #[error("protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("application error {code}: {message}")]
    Application {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl RpcFailure {
    pub fn code(&self) -> i64 {
        match self {
            RpcFailure::Protocol { code, .. } => *code,
            RpcFailure::Application { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RpcFailure::Protocol { message, .. } => message,
            RpcFailure::Application { message, .. } => message,
        }
    }

    /// The `data` member of an application failure, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            RpcFailure::Protocol { .. } => None,
            RpcFailure::Application { data, .. } => data.as_ref(),
        }
    }

    /// Classifies a received error by its code: reserved range means a
    /// protocol failure, anything else an application failure.
    pub fn classify(code: i64, message: String, data: Option<Value>) -> Self {
        if is_reserved_code(code) {
            RpcFailure::Protocol { code, message }
        } else {
            RpcFailure::Application {
                code,
                message,
                data,
            }
        }
    }
}
