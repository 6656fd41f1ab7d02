//! The call engine: encode, exchange, decode, check, unwrap.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use twinrpc_protocol::{Params, RequestId, codec};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::transport::{HeaderGuard, HeaderStack, Transport};

/// A JSON-RPC client over a pluggable transport.
///
/// `call` blocks the caller (suspends, in async terms) for the duration of
/// the round trip; `notify` sends without expecting content back. Faults the
/// peer returns come back as [`ClientError::Rpc`], split into protocol and
/// application failures by code range.
pub struct RpcClient<T: Transport> {
    pub(crate) transport: T,
    config: ClientConfig,
    headers: HeaderStack,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            headers: HeaderStack::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Adds a header layer for all subsequent calls; remove with
    /// [`RpcClient::pop_headers`].
    pub fn push_headers(&self, headers: HashMap<String, String>) {
        self.headers.push(headers);
    }

    pub fn pop_headers(&self) -> Option<HashMap<String, String>> {
        self.headers.pop()
    }

    /// Adds a header layer scoped to the returned guard's lifetime.
    pub fn scoped_headers(&self, headers: HashMap<String, String>) -> HeaderGuard<'_> {
        HeaderGuard::new(&self.headers, headers)
    }

    /// Calls a method and returns its result, with a fresh unique request
    /// id.
    pub async fn call(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<Value, ClientError> {
        let id = RequestId::String(Uuid::new_v4().to_string());
        self.call_with_id(method, params, id).await
    }

    /// Calls a method under a caller-supplied request id.
    pub async fn call_with_id(
        &self,
        method: &str,
        params: impl Into<Params>,
        id: RequestId,
    ) -> Result<Value, ClientError> {
        let request = codec::encode_request(method, &params.into(), &id, self.config.version, false)?;
        debug!(method, "sending call");

        let response = self.run_request(request.to_string()).await?;
        let Some(response) = response else {
            return Err(ClientError::InvalidResponse(
                "no response content for a method call".to_string(),
            ));
        };

        codec::check_for_errors(&response)?;
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Sends a notification: no id, no result. Any content the peer answers
    /// with is decoded for error checking only.
    pub async fn notify(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<(), ClientError> {
        let request =
            codec::encode_request(method, &params.into(), &RequestId::Null, self.config.version, true)?;
        debug!(method, "sending notification");

        if let Some(response) = self.run_request(request.to_string()).await? {
            codec::check_for_errors(&response)?;
        }
        Ok(())
    }

    /// One marshaled exchange through the transport; `None` means the peer
    /// answered with no content.
    pub(crate) async fn run_request(&self, body: String) -> Result<Option<Value>, ClientError> {
        let headers = self.request_headers();
        let response = self
            .transport
            .exchange(&self.config.path, &body, &headers)
            .await?;

        match response {
            None => Ok(None),
            Some(text) => codec::decode(&text).map_err(|fault| {
                ClientError::Rpc(twinrpc_protocol::RpcFailure::Protocol {
                    code: fault.code,
                    message: fault.message,
                })
            }),
        }
    }

    fn request_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), self.config.content_type.clone());
        headers.insert("user-agent".to_string(), self.config.user_agent.clone());
        headers.extend(self.headers.flattened());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::transport::TransportError;

    /// Replays canned response bodies and records what was sent.
    struct ScriptedTransport {
        sent: Mutex<Vec<(String, HashMap<String, String>)>>,
        replies: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedTransport {
        fn replying(replies: Vec<Option<&str>>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
            }
        }

        fn sent_bodies(&self) -> Vec<Value> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(body, _)| serde_json::from_str(body).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn exchange(
            &self,
            _path: &str,
            body: &str,
            headers: &HashMap<String, String>,
        ) -> Result<Option<String>, TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((body.to_string(), headers.clone()));
            Ok(self.replies.lock().unwrap().pop().unwrap_or(None))
        }
    }

    #[tokio::test]
    async fn call_unwraps_result() {
        let transport = ScriptedTransport::replying(vec![Some(
            r#"{"jsonrpc": "2.0", "result": 19, "id": "fixed"}"#,
        )]);
        let client = RpcClient::new(transport);

        let result = client
            .call_with_id("subtract", vec![json!(42), json!(23)], RequestId::from("fixed"))
            .await
            .unwrap();
        assert_eq!(result, json!(19));

        let sent = client.transport.sent_bodies();
        assert_eq!(
            sent[0],
            json!({"jsonrpc": "2.0", "method": "subtract", "params": [42, 23], "id": "fixed"})
        );
    }

    #[tokio::test]
    async fn call_generates_unique_ids() {
        let transport = ScriptedTransport::replying(vec![None, None]);
        let client = RpcClient::new(transport);

        // Both calls fail on the empty reply; we only care about the ids sent
        let _ = client.call("ping", ()).await;
        let _ = client.call("ping", ()).await;

        let sent = client.transport.sent_bodies();
        let first = sent[0]["id"].as_str().unwrap().to_string();
        let second = sent[1]["id"].as_str().unwrap().to_string();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn call_without_content_is_invalid() {
        let transport = ScriptedTransport::replying(vec![None]);
        let client = RpcClient::new(transport);

        let err = client.call("ping", ()).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn fault_reply_raises_protocol_failure() {
        let transport = ScriptedTransport::replying(vec![Some(
            r#"{"jsonrpc": "2.0", "error": {"code": -32601, "message": "Method not found"}, "id": 1}"#,
        )]);
        let client = RpcClient::new(transport);

        let err = client.call("missing", ()).await.unwrap_err();
        assert!(err.is_protocol_failure());
        assert_eq!(err.fault_code(), Some(-32601));
    }

    #[tokio::test]
    async fn fault_reply_raises_application_failure() {
        let transport = ScriptedTransport::replying(vec![Some(
            r#"{"jsonrpc": "2.0", "error": {"code": 42, "message": "boom", "data": [1]}, "id": 1}"#,
        )]);
        let client = RpcClient::new(transport);

        let err = client.call("app", ()).await.unwrap_err();
        assert!(err.is_application_failure());
        assert_eq!(err.fault_code(), Some(42));
    }

    #[tokio::test]
    async fn notify_omits_id_and_accepts_no_content() {
        let transport = ScriptedTransport::replying(vec![None]);
        let client = RpcClient::new(transport);

        client.notify("notify_hello", vec![json!(7)]).await.unwrap();

        let sent = client.transport.sent_bodies();
        assert_eq!(
            sent[0],
            json!({"jsonrpc": "2.0", "method": "notify_hello", "params": [7]})
        );
    }

    #[tokio::test]
    async fn v1_notify_sends_null_id() {
        let transport = ScriptedTransport::replying(vec![None]);
        let client = RpcClient::with_config(transport, ClientConfig::v1());

        client.notify("notify_hello", vec![json!(7)]).await.unwrap();

        let sent = client.transport.sent_bodies();
        assert_eq!(
            sent[0],
            json!({"id": null, "method": "notify_hello", "params": [7]})
        );
    }

    #[tokio::test]
    async fn headers_are_layered() {
        let transport = ScriptedTransport::replying(vec![None, None]);
        let client = RpcClient::new(transport);

        {
            let _scope = client.scoped_headers(
                [("x-test".to_string(), "yes".to_string())].into_iter().collect(),
            );
            let _ = client.notify("ping", ()).await;
        }
        let _ = client.notify("ping", ()).await;

        let sent = client.transport.sent.lock().unwrap();
        assert_eq!(sent[0].1.get("x-test"), Some(&"yes".to_string()));
        assert!(!sent[1].1.contains_key("x-test"));
        assert_eq!(
            sent[0].1.get("content-type"),
            Some(&"application/json-rpc".to_string())
        );
    }

    #[tokio::test]
    async fn garbage_reply_is_a_parse_failure() {
        let transport = ScriptedTransport::replying(vec![Some("{not json")]);
        let client = RpcClient::new(transport);

        let err = client.call("ping", ()).await.unwrap_err();
        assert_eq!(err.fault_code(), Some(-32700));
    }
}
