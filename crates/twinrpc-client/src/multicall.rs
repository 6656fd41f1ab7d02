//! Batch accumulation (MultiCall) and the lazy result view.

use serde_json::Value;
use tracing::debug;

use twinrpc_protocol::{Params, RequestId, Version, codec};

use crate::client::RpcClient;
use crate::error::ClientError;
use crate::transport::Transport;

struct PendingCall {
    method: String,
    params: Params,
    notify: bool,
    id: i64,
}

/// Accumulates calls for batch execution.
///
/// Each recorded call gets a deferred id from a running counter;
/// notifications are recorded to render without an `id` key at all.
/// Executing the batch concatenates every recorded call into one JSON array,
/// sends it once, and returns a [`MultiCallResults`] view over the decoded
/// reply, or `None` when the reply had no content (an all-notification
/// batch). Batches are a 2.0 feature and always encode as 2.0.
pub struct MultiCall<'a, T: Transport> {
    client: &'a RpcClient<T>,
    pending: Vec<PendingCall>,
    next_id: i64,
}

impl<'a, T: Transport> MultiCall<'a, T> {
    pub fn new(client: &'a RpcClient<T>) -> Self {
        Self {
            client,
            pending: Vec::new(),
            next_id: 0,
        }
    }

    /// Records a call; nothing is sent until [`MultiCall::execute`].
    pub fn add(&mut self, method: &str, params: impl Into<Params>) -> &mut Self {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(PendingCall {
            method: method.to_string(),
            params: params.into(),
            notify: false,
            id,
        });
        self
    }

    /// Records a notification: rendered without an `id` key, answered by
    /// nothing.
    pub fn add_notify(&mut self, method: &str, params: impl Into<Params>) -> &mut Self {
        self.pending.push(PendingCall {
            method: method.to_string(),
            params: params.into(),
            notify: true,
            id: 0,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sends the accumulated batch and returns the result view, or `None`
    /// when the peer answered with no content. The pending list is cleared
    /// once the exchange succeeds; on a transport error it is kept so the
    /// batch can be retried.
    pub async fn execute(&mut self) -> Result<Option<MultiCallResults>, ClientError> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(self.pending.len());
        for call in &self.pending {
            entries.push(codec::encode_request(
                &call.method,
                &call.params,
                &RequestId::Number(call.id),
                Version::V2,
                call.notify,
            )?);
        }
        debug!(calls = entries.len(), "sending batch");

        let response = self.client.run_request(Value::Array(entries).to_string()).await?;
        self.pending.clear();

        match response {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(MultiCallResults { items })),
            Some(other) => {
                // A single object here is a batch-level fault
                codec::check_for_errors(&other)?;
                Err(ClientError::InvalidResponse(
                    "batch response is not an array".to_string(),
                ))
            }
        }
    }
}

/// An indexable view over a decoded batch response.
///
/// Each element is error-checked on access, so a fault in entry `k` raises
/// only when entry `k` is consumed. The view is restartable: elements may be
/// read repeatedly and in any order.
#[derive(Debug)]
pub struct MultiCallResults {
    items: Vec<Value>,
}

impl MultiCallResults {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The result of the i-th answered call, raising its fault if it carried
    /// one.
    pub fn get(&self, index: usize) -> Result<Value, ClientError> {
        let item = self.items.get(index).ok_or_else(|| {
            ClientError::InvalidResponse(format!("no batch result at index {index}"))
        })?;
        codec::check_for_errors(item)?;
        Ok(item.get("result").cloned().unwrap_or(Value::Null))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Value, ClientError>> + '_ {
        (0..self.items.len()).map(|index| self.get(index))
    }
}
