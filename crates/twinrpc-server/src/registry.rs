//! Method registry and parameter binding.
//!
//! Methods are registered under an exact name or inside a dotted namespace
//! (`namespace.method`), each with a declared parameter contract. Incoming
//! positional or keyword params are bound against that contract explicitly;
//! a mismatch surfaces as a bind error which dispatch maps to the invalid
//! parameters fault.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use twinrpc_protocol::{Fault, Params};

/// A registered method handler. Returning `Err(Fault)` is the normal
/// application-error channel; the fault is encoded as the call's error
/// response.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn invoke(&self, args: Vec<Value>) -> Result<Value, Fault>;
}

/// Adapter for registering a plain closure as a handler.
pub struct FnHandler<F>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Fault>> + Send + Sync,
{
    handler_fn: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Fault>> + Send + Sync,
{
    pub fn new(handler_fn: F) -> Self {
        Self { handler_fn }
    }
}

#[async_trait]
impl<F> RpcHandler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Fault>> + Send + Sync,
{
    async fn invoke(&self, args: Vec<Value>) -> Result<Value, Fault> {
        (self.handler_fn)(args).await
    }
}

/// A parameter binding failure; dispatch maps this to fault -32602.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("expected at most {expected} parameter(s), got {got}")]
    TooManyArguments { expected: usize, got: usize },

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
}

#[derive(Debug, Clone)]
struct ParamSlot {
    name: String,
    default: Option<Value>,
}

/// The parameter contract a method declares at registration: ordered names,
/// each optionally defaulted. Positional params bind by position, keyword
/// params by name; both produce the same ordered argument list.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    slots: Vec<ParamSlot>,
}

impl ParamSpec {
    /// A contract with no parameters.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.slots.push(ParamSlot {
            name: name.to_string(),
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: &str, default: Value) -> Self {
        self.slots.push(ParamSlot {
            name: name.to_string(),
            default: Some(default),
        });
        self
    }

    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Binds incoming params to the declared slots, in declaration order.
    pub fn bind(&self, params: &Params) -> Result<Vec<Value>, BindError> {
        match params {
            Params::Array(positional) => {
                if positional.len() > self.slots.len() {
                    return Err(BindError::TooManyArguments {
                        expected: self.slots.len(),
                        got: positional.len(),
                    });
                }
                self.slots
                    .iter()
                    .enumerate()
                    .map(|(index, slot)| {
                        positional
                            .get(index)
                            .cloned()
                            .or_else(|| slot.default.clone())
                            .ok_or_else(|| BindError::MissingParameter(slot.name.clone()))
                    })
                    .collect()
            }
            Params::Object(named) => {
                if let Some(unknown) = named
                    .keys()
                    .find(|key| !self.slots.iter().any(|slot| &slot.name == *key))
                {
                    return Err(BindError::UnknownParameter(unknown.clone()));
                }
                self.slots
                    .iter()
                    .map(|slot| {
                        named
                            .get(&slot.name)
                            .cloned()
                            .or_else(|| slot.default.clone())
                            .ok_or_else(|| BindError::MissingParameter(slot.name.clone()))
                    })
                    .collect()
            }
        }
    }
}

/// A handler plus its declared parameter contract.
#[derive(Clone)]
pub(crate) struct RegisteredMethod {
    pub(crate) spec: ParamSpec,
    pub(crate) handler: Arc<dyn RpcHandler>,
}

/// Two-level method lookup: exact names first, then `namespace.method`
/// resolution against the namespace table. Append-only after startup and
/// safe for concurrent reads.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, RegisteredMethod>,
    namespaces: HashMap<String, HashMap<String, RegisteredMethod>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under an exact method name.
    pub fn register<H>(&mut self, name: &str, spec: ParamSpec, handler: H)
    where
        H: RpcHandler + 'static,
    {
        self.methods.insert(
            name.to_string(),
            RegisteredMethod {
                spec,
                handler: Arc::new(handler),
            },
        );
    }

    /// Registers a handler reachable as `namespace.name`.
    pub fn register_in_namespace<H>(
        &mut self,
        namespace: &str,
        name: &str,
        spec: ParamSpec,
        handler: H,
    ) where
        H: RpcHandler + 'static,
    {
        self.namespaces.entry(namespace.to_string()).or_default().insert(
            name.to_string(),
            RegisteredMethod {
                spec,
                handler: Arc::new(handler),
            },
        );
    }

    pub(crate) fn resolve(&self, method: &str) -> Option<&RegisteredMethod> {
        if let Some(found) = self.methods.get(method) {
            return Some(found);
        }
        let (namespace, name) = method.split_once('.')?;
        self.namespaces.get(namespace)?.get(name)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.resolve(method).is_some()
    }

    /// All reachable method names, namespaced ones in dotted form.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        for (namespace, methods) in &self.namespaces {
            names.extend(methods.keys().map(|name| format!("{namespace}.{name}")));
        }
        names.sort();
        names.dedup();
        names
    }
}
