//! The server-side dispatch state machine.
//!
//! One inbound body runs decode → shape check → (batch | single) →
//! validate → resolve → invoke → response assembly. Decode and validation
//! failures become fault responses; notifications produce nothing and may be
//! handed to the worker pool; a batch answers with the in-order responses of
//! its non-notification entries, or with no content when there are none.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use twinrpc_protocol::{Fault, Params, Version, codec};

use crate::config::ServerConfig;
use crate::pool::{WorkerPool, panic_message};
use crate::registry::{MethodRegistry, ParamSpec, RpcHandler};

/// The protocol engine behind a transport's `handle(bytes) -> bytes?`
/// boundary.
///
/// Stateless and reentrant: the registry is read-only once serving begins,
/// so any number of connections may dispatch through `&self` concurrently.
pub struct ProtocolHandler {
    registry: MethodRegistry,
    config: ServerConfig,
    notification_pool: Option<WorkerPool>,
}

impl ProtocolHandler {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: MethodRegistry::new(),
            config,
            notification_pool: None,
        }
    }

    /// Runs notifications through the given pool instead of inline; the
    /// engine then returns before the notification executes. The pool must
    /// be started.
    pub fn with_notification_pool(mut self, pool: WorkerPool) -> Self {
        self.notification_pool = Some(pool);
        self
    }

    /// Registers a handler under an exact method name. Registration happens
    /// before serving begins.
    pub fn register<H>(&mut self, name: &str, spec: ParamSpec, handler: H)
    where
        H: RpcHandler + 'static,
    {
        self.registry.register(name, spec, handler);
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
        self.registry
            .register_in_namespace(namespace, name, spec, handler);
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Drains and stops the notification pool, if one is configured.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.notification_pool {
            pool.stop().await;
        }
    }

    /// Handles one marshaled request body and returns the marshaled
    /// response, or `None` when there is nothing to answer (notifications,
    /// all-notification batches).
    pub async fn handle(&self, body: &str) -> Option<String> {
        let request = match codec::decode(body) {
            Ok(Some(request)) => request,
            Ok(None) => {
                let fault = Fault::invalid_request("Request invalid -- no request data.");
                warn!(%fault, "empty request");
                return Some(fault.to_response(&Value::Null, self.config.version).to_string());
            }
            Err(fault) => {
                warn!(%fault, "unparseable request");
                return Some(fault.to_response(&Value::Null, self.config.version).to_string());
            }
        };

        self.handle_value(request).await.map(|response| response.to_string())
    }

    /// Same as [`ProtocolHandler::handle`] for an already-parsed request
    /// value (single object or batch array).
    pub async fn handle_value(&self, request: Value) -> Option<Value> {
        if is_empty_request(&request) {
            let fault = Fault::invalid_request("Request invalid -- no request data.");
            warn!(%fault, "invalid request");
            return Some(fault.to_response(&Value::Null, self.config.version));
        }

        if let Value::Array(entries) = request {
            // Batch: collect the in-order outcomes of non-notification entries
            let mut responses = Vec::new();
            for entry in entries {
                if let Some(response) = self.handle_single(entry).await {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                debug!("batch produced no responses");
                return None;
            }
            return Some(Value::Array(responses));
        }

        self.handle_single(request).await
    }

    async fn handle_single(&self, request: Value) -> Option<Value> {
        let Some(entry) = request.as_object() else {
            let fault = Fault::invalid_request(format!(
                "Request must be an object, not {}",
                json_type_name(&request)
            ));
            warn!(%fault, "invalid request content");
            return Some(fault.to_response(&Value::Null, self.config.version));
        };

        let id = entry.get("id").cloned().unwrap_or(Value::Null);

        if Version::of(&request).is_none() {
            let fault = Fault::invalid_request(format!("Request {request} invalid."));
            warn!(%fault, "no version in request");
            return Some(fault.to_response(&id, self.config.version));
        }

        // A 1.0 request served by a 2.0 engine gets a 1.0 response
        let response_version = if !entry.contains_key("jsonrpc") && self.config.version >= Version::V2
        {
            Version::V1
        } else {
            self.config.version
        };

        let params = match entry.get("params") {
            None => Params::empty(),
            Some(value) => match Params::from_value(value) {
                Some(params) => params,
                None => {
                    let fault = Fault::invalid_request("Invalid request parameters or method.");
                    warn!(%fault, "invalid request content");
                    return Some(fault.to_response(&id, self.config.version));
                }
            },
        };

        let method = match entry.get("method").and_then(Value::as_str) {
            Some(method) if !method.is_empty() => method.to_string(),
            _ => {
                let fault = Fault::invalid_request("Invalid request parameters or method.");
                warn!(%fault, "invalid request content");
                return Some(fault.to_response(&id, self.config.version));
            }
        };

        let notification = codec::is_notification(&request);

        if notification {
            if let Some(pool) = &self.notification_pool {
                self.enqueue_notification(pool, &method, params);
                return None;
            }
        }

        let outcome = self.invoke(&method, &params).await;

        if notification {
            // No result needed, whatever the outcome was
            return None;
        }

        match outcome {
            Ok(result) => match codec::encode_response(&result, &id, response_version) {
                Ok(response) => Some(response),
                Err(err) => {
                    let fault = Fault::internal_error(&err);
                    error!(%fault, "error preparing result");
                    Some(fault.to_response(&id, response_version))
                }
            },
            Err(fault) => Some(fault.to_response(&id, response_version)),
        }
    }

    /// Resolves and invokes a method; every failure comes back as a fault.
    /// This is the single point where user code runs, so panics are caught
    /// and converted here.
    async fn invoke(&self, method: &str, params: &Params) -> Result<Value, Fault> {
        let Some(registered) = self.registry.resolve(method) else {
            let fault = Fault::method_not_found(method);
            warn!(%fault, "unknown method");
            return Err(fault);
        };

        let args = registered.spec.bind(params).map_err(|err| {
            let fault = Fault::invalid_params(&err);
            warn!(%fault, method, "invalid call parameters");
            fault
        })?;

        match AssertUnwindSafe(registered.handler.invoke(args))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(fault)) => {
                error!(%fault, method, "error calling method");
                Err(fault)
            }
            Err(panic) => {
                let fault = Fault::internal_error(panic_message(panic.as_ref()));
                error!(%fault, method, "handler panicked");
                Err(fault)
            }
        }
    }

    /// Fire-and-forget execution: resolve and bind now, run on the pool.
    /// Failures are logged, never surfaced.
    fn enqueue_notification(&self, pool: &WorkerPool, method: &str, params: Params) {
        let Some(registered) = self.registry.resolve(method) else {
            warn!(method, "unknown notification method");
            return;
        };

        let handler = registered.handler.clone();
        let spec = registered.spec.clone();
        let method = method.to_string();
        let task_method = method.clone();
        let task = async move {
            let method = task_method;
            match spec.bind(&params) {
                Ok(args) => {
                    if let Err(fault) = handler.invoke(args).await {
                        error!(%fault, method, "notification handler failed");
                    }
                }
                Err(err) => warn!(%err, method, "invalid notification parameters"),
            }
        }
        .boxed();

        if let Err(err) = pool.enqueue(task) {
            warn!(%err, method, "notification dropped");
        }
    }
}

fn is_empty_request(request: &Value) -> bool {
    match request {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FnHandler;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_handler() -> ProtocolHandler {
        let mut handler = ProtocolHandler::new(ServerConfig::default());
        handler.register(
            "subtract",
            ParamSpec::none().required("minuend").required("subtrahend"),
            FnHandler::new(|args: Vec<Value>| {
                async move {
                    let minuend = args[0].as_i64().unwrap_or(0);
                    let subtrahend = args[1].as_i64().unwrap_or(0);
                    Ok(json!(minuend - subtrahend))
                }
                .boxed()
            }),
        );
        handler.register(
            "fail",
            ParamSpec::none(),
            FnHandler::new(|_| {
                async move { Err(Fault::new(7, "application failed")) }.boxed()
            }),
        );
        handler.register(
            "explode",
            ParamSpec::none(),
            FnHandler::new(|_| async move { panic!("handler blew up") }.boxed()),
        );
        handler
    }

    #[tokio::test]
    async fn positional_call() {
        let handler = test_handler();
        let response = handler
            .handle(r#"{"jsonrpc": "2.0", "method": "subtract", "params": [42, 23], "id": 1}"#)
            .await
            .unwrap();
        let response: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response, json!({"jsonrpc": "2.0", "result": 19, "id": 1}));
    }

    #[tokio::test]
    async fn keyword_call() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!({
                "jsonrpc": "2.0",
                "method": "subtract",
                "params": {"subtrahend": 23, "minuend": 42},
                "id": 3
            }))
            .await
            .unwrap();
        assert_eq!(response["result"], json!(19));
    }

    #[tokio::test]
    async fn unknown_method_echoes_id() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!({"jsonrpc": "2.0", "method": "foobar", "id": "1"}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(-32601));
        assert_eq!(response["id"], json!("1"));
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error_with_null_id() {
        let handler = test_handler();
        let response = handler
            .handle(r#"{"jsonrpc": "2.0", "method": "foobar, "params": "bar", "baz]"#)
            .await
            .unwrap();
        let response: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["error"]["code"], json!(-32700));
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn request_without_version_markers_is_invalid() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!({"method": "subtract", "params": [42, 23]}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(-32600));
    }

    #[tokio::test]
    async fn invalid_params_fault() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!({
                "jsonrpc": "2.0", "method": "subtract", "params": [1, 2, 3], "id": 4
            }))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(-32602));
        assert_eq!(response["id"], json!(4));
    }

    #[tokio::test]
    async fn handler_fault_is_returned_verbatim() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!({"jsonrpc": "2.0", "method": "fail", "id": 5}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(7));
        assert_eq!(response["error"]["message"], json!("application failed"));
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_error() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!({"jsonrpc": "2.0", "method": "explode", "id": 6}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], json!(-32603));
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("handler blew up")
        );
    }

    #[tokio::test]
    async fn notification_produces_no_content() {
        let handler = test_handler();
        assert!(
            handler
                .handle_value(json!({"jsonrpc": "2.0", "method": "subtract", "params": [2, 1]}))
                .await
                .is_none()
        );
        // 1.0 notification: null id
        assert!(
            handler
                .handle_value(json!({"method": "subtract", "params": [2, 1], "id": null}))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn batch_preserves_order_and_skips_notifications() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!([
                {"jsonrpc": "2.0", "method": "subtract", "params": [7, 4], "id": 1},
                {"jsonrpc": "2.0", "method": "subtract", "params": [0, 0]},
                {"jsonrpc": "2.0", "method": "subtract", "params": [42, 23], "id": 2}
            ]))
            .await
            .unwrap();
        let responses = response.as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], json!(1));
        assert_eq!(responses[0]["result"], json!(3));
        assert_eq!(responses[1]["id"], json!(2));
        assert_eq!(responses[1]["result"], json!(19));
    }

    #[tokio::test]
    async fn all_notification_batch_is_no_content() {
        let handler = test_handler();
        let outcome = handler
            .handle_value(json!([
                {"jsonrpc": "2.0", "method": "subtract", "params": [1, 1]},
                {"jsonrpc": "2.0", "method": "subtract", "params": [2, 2]}
            ]))
            .await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn empty_batch_is_invalid_request() {
        let handler = test_handler();
        let response = handler.handle("[]").await.unwrap();
        let response: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(response["error"]["code"], json!(-32600));
    }

    #[tokio::test]
    async fn batch_with_invalid_entry_still_answers_others() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!([
                {"jsonrpc": "2.0", "method": "subtract", "params": [5, 2], "id": 1},
                "not-a-request",
                {"jsonrpc": "2.0", "method": "foobar", "id": 2}
            ]))
            .await
            .unwrap();
        let responses = response.as_array().unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["result"], json!(3));
        assert_eq!(responses[1]["error"]["code"], json!(-32600));
        assert_eq!(responses[2]["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn v1_request_gets_v1_response_from_v2_server() {
        let handler = test_handler();
        let response = handler
            .handle_value(json!({"method": "subtract", "params": [42, 23], "id": "v1-call"}))
            .await
            .unwrap();
        // Downgraded shape: result + null error, no version tag
        assert_eq!(response["result"], json!(19));
        assert_eq!(response["error"], Value::Null);
        assert!(response.get("jsonrpc").is_none());
        assert_eq!(response["id"], json!("v1-call"));
    }

    #[tokio::test]
    async fn pooled_notification_runs_asynchronously() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(1, 2);
        pool.start();

        let mut handler =
            ProtocolHandler::new(ServerConfig::default()).with_notification_pool(pool);
        let seen = Arc::clone(&counter);
        handler.register(
            "bump",
            ParamSpec::none(),
            FnHandler::new(move |_| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
                .boxed()
            }),
        );

        let outcome = handler
            .handle_value(json!({"jsonrpc": "2.0", "method": "bump"}))
            .await;
        assert!(outcome.is_none());

        handler.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
