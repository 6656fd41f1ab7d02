//! The transport boundary and the layered header stack.
//!
//! The engine supplies UTF-8 JSON text and a flattened header map; the
//! transport exchanges bytes with the peer and hands back the response body,
//! or `None` when the peer answered with no content.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Transport-level failures, owned entirely by the transport implementation
/// and opaque to the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("transport closed unexpectedly")]
    Closed,

    #[error("transport error: {0}")]
    Other(String),
}

/// One request/response exchange with the peer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a marshaled request body to `path` and returns the response
    /// body, or `None` for a no-content reply (notification round trip).
    async fn exchange(
        &self,
        path: &str,
        body: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Option<String>, TransportError>;
}

/// Caller-supplied headers, layered as a stack: later layers override
/// earlier ones when flattened. Pushing and popping around a scoped set of
/// calls lets a caller add headers temporarily without touching the client.
#[derive(Debug, Default)]
pub struct HeaderStack {
    layers: Mutex<Vec<HashMap<String, String>>>,
}

impl HeaderStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, headers: HashMap<String, String>) {
        self.layers
            .lock()
            .expect("header stack lock poisoned")
            .push(headers);
    }

    pub fn pop(&self) -> Option<HashMap<String, String>> {
        self.layers.lock().expect("header stack lock poisoned").pop()
    }

    /// The stack merged top-most-last into a single map.
    pub fn flattened(&self) -> HashMap<String, String> {
        let layers = self.layers.lock().expect("header stack lock poisoned");
        let mut merged = HashMap::new();
        for layer in layers.iter() {
            for (name, value) in layer {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    pub fn depth(&self) -> usize {
        self.layers.lock().expect("header stack lock poisoned").len()
    }
}

/// Pops one header layer when dropped; returned by
/// [`crate::RpcClient::scoped_headers`].
pub struct HeaderGuard<'a> {
    stack: &'a HeaderStack,
}

impl<'a> HeaderGuard<'a> {
    pub(crate) fn new(stack: &'a HeaderStack, headers: HashMap<String, String>) -> Self {
        stack.push(headers);
        Self { stack }
    }
}

impl Drop for HeaderGuard<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}
