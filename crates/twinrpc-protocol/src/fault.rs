use serde_json::{Map, Value, json};
use std::fmt;

use crate::error_codes;
use crate::types::Version;

/// A JSON-RPC error as a first-class value.
///
/// The dispatch engine returns faults instead of raising them, so normal
/// control flow carries protocol-level errors from user code to the wire. A
/// fault owns no resources and compares by value.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl Fault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method {method} not supported."),
        )
    }

    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        Self::new(
            error_codes::INVALID_PARAMS,
            format!("Invalid parameters: {detail}"),
        )
    }

    pub fn internal_error(detail: impl fmt::Display) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, format!("Server error: {detail}"))
    }

    pub fn server_error(code: i64, message: impl Into<String>) -> Self {
        debug_assert!(
            (error_codes::SERVER_ERROR_START..=error_codes::SERVER_ERROR_END).contains(&code),
            "server error code must be in range -32099 to -32000"
        );
        Self::new(code, message)
    }

    /// True for codes in the reserved protocol range [-32700, -32000].
    pub fn is_reserved(&self) -> bool {
        crate::failure::is_reserved_code(self.code)
    }

    /// The wire error object: `{"code", "message"}` plus `"data"` when set.
    pub fn to_error_object(&self) -> Value {
        let mut error = Map::new();
        error.insert("code".to_string(), json!(self.code));
        error.insert("message".to_string(), json!(self.message));
        if let Some(data) = &self.data {
            error.insert("data".to_string(), data.clone());
        }
        Value::Object(error)
    }

    /// The version-appropriate error response for this fault.
    ///
    /// 1.0 responses carry both `result` (null) and `error`; 2.0 responses
    /// carry the `jsonrpc` tag and the `error` member only.
    pub fn to_response(&self, id: &Value, version: Version) -> Value {
        let mut response = Map::new();
        match version {
            Version::V1 => {
                response.insert("result".to_string(), Value::Null);
            }
            Version::V2 => {
                response.insert(
                    "jsonrpc".to_string(),
                    json!(crate::JSONRPC_VERSION_TAG),
                );
            }
        }
        response.insert("error".to_string(), self.to_error_object());
        response.insert("id".to_string(), id.clone());
        Value::Object(response)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Fault {}: {}>", self.code, self.message)
    }
}
