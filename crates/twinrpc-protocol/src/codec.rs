//! Payload codec: builds and parses the wire dictionaries of both protocol
//! generations. Everything that knows what a request, notification, response
//! or error object looks like on the wire lives here.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::JSONRPC_VERSION_TAG;
use crate::failure::RpcFailure;
use crate::fault::Fault;
use crate::types::{Params, RequestId, Version};

/// Errors raised while building a payload, before anything touches the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("method name must be a non-empty string")]
    EmptyMethod,

    #[error("a method response must carry a request id")]
    MissingResponseId,
}

/// Builds a request or notification object for the given generation.
///
/// 1.0 always emits the `params` key (empty array by default) and renders a
/// notification as `"id": null`; 2.0 omits empty `params`, omits the `id` key
/// of a notification entirely, and tags the object with `"jsonrpc"`.
pub fn encode_request(
    method: &str,
    params: &Params,
    id: &RequestId,
    version: Version,
    notify: bool,
) -> Result<Value, CodecError> {
    if method.is_empty() {
        return Err(CodecError::EmptyMethod);
    }

    let mut request = Map::new();
    match version {
        Version::V1 => {
            // 1.0 notifications are ordinary requests with a null id.
            request.insert(
                "id".to_string(),
                if notify { Value::Null } else { id.to_value() },
            );
            request.insert("method".to_string(), json!(method));
            request.insert("params".to_string(), params.to_value());
        }
        Version::V2 => {
            if !notify {
                request.insert("id".to_string(), id.to_value());
            }
            request.insert("method".to_string(), json!(method));
            if !params.is_empty() {
                request.insert("params".to_string(), params.to_value());
            }
            request.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION_TAG));
        }
    }
    Ok(Value::Object(request))
}

/// Builds a success response object for the given generation.
///
/// Every response must be addressable, so a null id is rejected. 1.0
/// responses carry both `result` and `error` (error null); 2.0 responses
/// carry `result` plus the `jsonrpc` tag.
pub fn encode_response(result: &Value, id: &Value, version: Version) -> Result<Value, CodecError> {
    if id.is_null() {
        return Err(CodecError::MissingResponseId);
    }

    let mut response = Map::new();
    response.insert("result".to_string(), result.clone());
    match version {
        Version::V1 => {
            response.insert("error".to_string(), Value::Null);
        }
        Version::V2 => {
            response.insert("jsonrpc".to_string(), json!(JSONRPC_VERSION_TAG));
        }
    }
    response.insert("id".to_string(), id.clone());
    Ok(Value::Object(response))
}

/// Parses a wire body.
///
/// An empty or blank body decodes to `None`: "no content", the result of a
/// notification round trip. Malformed JSON yields a parse-error fault whose
/// message embeds the offending text and the parser's description.
pub fn decode(text: &str) -> Result<Option<Value>, Fault> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    match serde_json::from_str(text) {
        Ok(value) => Ok(Some(value)),
        Err(err) => Err(Fault::parse_error(format!(
            "Request {text} invalid. ({err})"
        ))),
    }
}

/// Checks a decoded response object for an error member and classifies it.
///
/// A non-error object passes through unchanged. A populated `error` member
/// raises a protocol failure (reserved code range) or an application failure
/// (any other code, carrying message and optional data). Error objects
/// without a `code` (single-entry "reason" objects or raw values, as
/// produced by jabsorb-style peers) surface as protocol failures with the
/// default server error code.
pub fn check_for_errors(response: &Value) -> Result<&Value, RpcFailure> {
    if response.is_null() {
        // Notification round trip: nothing to check
        return Ok(response);
    }

    let Some(obj) = response.as_object() else {
        return Err(RpcFailure::Protocol {
            code: crate::error_codes::INVALID_REQUEST,
            message: "Response is not an object.".to_string(),
        });
    };

    if obj.is_empty() {
        return Ok(response);
    }

    if let Some(tag) = obj.get("jsonrpc") {
        if parse_version_tag(tag).is_some_and(|v| v > 2.0) {
            return Err(RpcFailure::Protocol {
                code: crate::error_codes::INVALID_REQUEST,
                message: "JSON-RPC version not yet supported.".to_string(),
            });
        }
    }

    if !obj.contains_key("result") && !obj.contains_key("error") {
        return Err(RpcFailure::Protocol {
            code: crate::error_codes::INVALID_REQUEST,
            message: "Response does not have a result or error key.".to_string(),
        });
    }

    let error = match obj.get("error") {
        None | Some(Value::Null) => return Ok(response),
        Some(error) => error,
    };

    match error {
        Value::Object(members) if members.is_empty() => Ok(response),
        Value::Object(members) => {
            if let Some(code) = members.get("code").and_then(Value::as_i64) {
                // Message from jsonrpclib peers, trace from jabsorb peers
                let message = members
                    .get("message")
                    .or_else(|| members.get("trace"))
                    .and_then(Value::as_str)
                    .unwrap_or("<no error message>")
                    .to_string();
                let data = members.get("data").cloned();
                Err(RpcFailure::classify(code, message, data))
            } else if members.len() == 1 {
                // Single-entry error ('reason', ...): use its content
                let (_, reason) = members.iter().next().unwrap();
                Err(RpcFailure::Protocol {
                    code: crate::error_codes::SERVER_ERROR_END,
                    message: stringify(reason),
                })
            } else {
                Err(RpcFailure::Protocol {
                    code: crate::error_codes::SERVER_ERROR_END,
                    message: stringify(error),
                })
            }
        }
        // Non-object error content: use it as the message
        other => Err(RpcFailure::Protocol {
            code: crate::error_codes::SERVER_ERROR_END,
            message: stringify(other),
        }),
    }
}

/// Tests whether a decoded request is a batch call.
///
/// Only a non-empty array whose first element is an object carrying a
/// float-parseable `"jsonrpc"` key of at least 2.0 qualifies; batches did
/// not exist before 2.0. A `"jsonrpc"` key that is present but not
/// float-parseable is a protocol failure.
pub fn is_batch(request: &Value) -> Result<bool, RpcFailure> {
    let Some(entries) = request.as_array() else {
        return Ok(false);
    };
    if entries.is_empty() {
        return Ok(false);
    }
    let Some(first) = entries[0].as_object() else {
        return Ok(false);
    };
    let Some(tag) = first.get("jsonrpc") else {
        return Ok(false);
    };

    let version = parse_version_tag(tag).ok_or_else(|| RpcFailure::Protocol {
        code: crate::error_codes::INVALID_REQUEST,
        message: "\"jsonrpc\" key must be a float(able) value.".to_string(),
    })?;

    Ok(version >= 2.0)
}

/// Tests whether a decoded request is a notification: the `id` is absent,
/// null, or an empty string.
pub fn is_notification(request: &Value) -> bool {
    match request.get("id") {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn parse_version_tag(tag: &Value) -> Option<f64> {
    match tag {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
