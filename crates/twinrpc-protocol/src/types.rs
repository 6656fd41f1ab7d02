use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-RPC protocol generation.
///
/// Carried per-request and per-response; the generation decides the wire
/// shape of every payload the codec builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Version {
    /// JSON-RPC 1.0
    V1,
    /// JSON-RPC 2.0
    #[default]
    V2,
}

impl Version {
    /// Infers the generation of an inbound request object.
    ///
    /// A `"jsonrpc"` key marks a 2.0 request; an `"id"` key without it marks
    /// a 1.0 request; a request carrying neither is malformed and yields
    /// `None`.
    pub fn of(request: &Value) -> Option<Version> {
        let obj = request.as_object()?;
        if obj.contains_key("jsonrpc") {
            Some(Version::V2)
        } else if obj.contains_key("id") {
            Some(Version::V1)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::V1 => write!(f, "1.0"),
            Version::V2 => write!(f, "2.0"),
        }
    }
}

/// A request id: a string, a number, or null.
///
/// A null id on an outbound call marks it a notification (1.0 wire form);
/// 2.0 notifications omit the key entirely. Ids are echoed verbatim in the
/// matching response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Null,
    Number(i64),
    String(String),
}

impl RequestId {
    pub fn is_null(&self) -> bool {
        matches!(self, RequestId::Null)
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Null => Value::Null,
            RequestId::Number(n) => Value::from(*n),
            RequestId::String(s) => Value::from(s.clone()),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// Call parameters: a positional sequence or a keyword mapping.
///
/// The two forms are mutually exclusive; a caller never supplies both for
/// the same call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Positional parameters as an array
    Array(Vec<Value>),
    /// Named parameters as an object
    Object(Map<String, Value>),
}

impl Params {
    /// An empty positional parameter list, the default for absent params.
    pub fn empty() -> Self {
        Params::Array(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Params::Array(items) => items.is_empty(),
            Params::Object(map) => map.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Array(items) => items.len(),
            Params::Object(map) => map.len(),
        }
    }

    /// Accepts only the two wire forms; anything else is not a valid
    /// parameter value.
    pub fn from_value(value: &Value) -> Option<Params> {
        match value {
            Value::Array(items) => Some(Params::Array(items.clone())),
            Value::Object(map) => Some(Params::Object(map.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Params::Array(items) => Value::Array(items.clone()),
            Params::Object(map) => Value::Object(map.clone()),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::empty()
    }
}

impl From<Vec<Value>> for Params {
    fn from(items: Vec<Value>) -> Self {
        Params::Array(items)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Object(map)
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::empty()
    }
}
