//! JSON-RPC method dispatch shared by every transport.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::gateway::Gateway;
use crate::types::{JsonRpcRequest, JsonRpcResponse, OperationBatch};

/// Method names served by the bridge.
pub const METHODS: &[&str] = &[
    "ping",
    "process_operations",
    "process_script",
    "generation_status",
    "list_capabilities",
];

/// Turns JSON-RPC requests into gateway calls.
#[derive(Debug, Clone)]
pub struct RpcHandler {
    gateway: Gateway,
}

impl RpcHandler {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Handle one raw request body. Returns `None` for notifications.
    pub async fn handle_str(&self, raw: &str) -> Option<JsonRpcResponse> {
        self.handle_bytes(raw.as_bytes()).await
    }

    /// Like [`handle_str`](Self::handle_str), for bytes that may not be
    /// UTF-8. Invalid UTF-8 is a parse error.
    pub async fn handle_bytes(&self, raw: &[u8]) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "bridge.rpc", error = %err, "unparseable request");
                return Some(JsonRpcResponse::error(Value::Null, &BridgeError::from(err)));
            },
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request).await,
            Err(err) => Some(JsonRpcResponse::error(
                id,
                &BridgeError::InvalidRequest(err.to_string()),
            )),
        }
    }

    /// Handle a parsed request. Notifications run but produce no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(target: "bridge.rpc", method = %request.method, "request");
        let outcome = self.call(&request.method, &request.params).await;
        let id = request.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::result(id, result),
            Err(err) => {
                debug!(
                    target: "bridge.rpc",
                    method = %request.method,
                    error = %err,
                    "request failed"
                );
                JsonRpcResponse::error(id, &err)
            },
        })
    }

    async fn call(&self, method: &str, params: &Value) -> Result<Value> {
        match method {
            "ping" => to_value(self.gateway.ping()),
            "process_operations" => {
                let batch = batch_param(params)?;
                to_value(self.gateway.process_operations(batch).await?)
            },
            "process_script" => {
                let code = param(params, 0, "code").and_then(Value::as_str).ok_or_else(|| {
                    BridgeError::invalid_params("process_script expects a 'code' string")
                })?;
                to_value(self.gateway.process_script(code).await?)
            },
            "generation_status" => to_value(self.gateway.generation_status()),
            "list_capabilities" => to_value(self.gateway.list_capabilities()),
            other => Err(BridgeError::MethodNotFound(other.to_string())),
        }
    }
}

/// Positional (`[a, b]`) or named (`{"a": .., "b": ..}`) parameter lookup.
fn param<'a>(params: &'a Value, index: usize, name: &str) -> Option<&'a Value> {
    match params {
        Value::Array(items) => items.get(index),
        Value::Object(map) => map.get(name),
        _ => None,
    }
}

/// The batch may be the first positional argument, a named `batch`, or the
/// params object itself.
fn batch_param(params: &Value) -> Result<OperationBatch> {
    let raw = match param(params, 0, "batch") {
        Some(value) => value,
        None if params.get("operations").is_some() => params,
        None => return Err(BridgeError::invalid_params("process_operations expects a batch")),
    };
    from_value(raw.clone())
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| BridgeError::invalid_params(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| BridgeError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::gateway::GatewayConfig;
    use crate::queue::{ResponseQueue, TaskQueue};
    use crate::registry::CapabilityRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn handler() -> RpcHandler {
        RpcHandler::new(Gateway::new(
            Arc::new(TaskQueue::new()),
            Arc::new(ResponseQueue::new()),
            Arc::new(CapabilityRegistry::builtin()),
            GatewayConfig {
                poll_interval: Duration::from_millis(2),
                batch_timeout: Duration::from_millis(20),
                script_timeout: Duration::from_millis(20),
                strip_code_fences: true,
            },
        ))
    }

    async fn call(raw: Value) -> Value {
        let response = handler().handle_str(&raw.to_string()).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn ping() {
        let response = call(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await;
        assert_eq!(
            response,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"status": "ok", "info": "scene bridge alive"}
            })
        );
    }

    #[tokio::test]
    async fn parse_error_has_null_id() {
        let response = handler().handle_str("{not json").await.unwrap();
        assert_eq!(response.id, Value::Null);
        assert_eq!(response.as_error().unwrap().code, -32700);
    }

    #[tokio::test]
    async fn unknown_method() {
        let response = call(json!({"jsonrpc": "2.0", "id": "a", "method": "teleport"})).await;
        assert_eq!(response["error"]["code"], json!(-32601));
        assert_eq!(response["id"], json!("a"));
    }

    #[tokio::test]
    async fn not_a_request() {
        let response = call(json!({"jsonrpc": "2.0", "id": 3})).await;
        assert_eq!(response["error"]["code"], json!(-32600));
        assert_eq!(response["id"], json!(3));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let raw = json!({"jsonrpc": "2.0", "method": "ping"}).to_string();
        assert!(handler().handle_str(&raw).await.is_none());
    }

    #[tokio::test]
    async fn rejected_script_carries_reason() {
        let response = call(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "process_script",
            "params": ["import os\nos.system('ls')"]
        }))
        .await;
        assert_eq!(
            response["error"],
            json!({
                "code": -32001,
                "message": "script rejected by sanitizer",
                "data": {"reason": "forbidden call detected: os.system"}
            })
        );
    }

    #[tokio::test]
    async fn missing_code_is_invalid_params() {
        let response = call(json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "process_script",
            "params": {"source": "x = 1"}
        }))
        .await;
        assert_eq!(response["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn batch_param_shapes() {
        let positional = json!([{"operations": [{"op": "reset"}]}]);
        let named = json!({"batch": {"operations": [{"op": "reset"}]}});
        let inline = json!({"operations": [{"op": "reset"}]});
        for params in [positional, named, inline] {
            assert_eq!(batch_param(&params).unwrap().len(), 1);
        }
        assert!(batch_param(&json!([])).is_err());
        assert!(batch_param(&json!([{"operations": "nope"}])).is_err());
    }

    #[tokio::test]
    async fn undrained_batch_reports_timeout() {
        let response = call(json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "process_operations",
            "params": [{"operations": [{"op": "reset"}]}]
        }))
        .await;
        assert_eq!(response["result"], json!({"error": "timeout"}));
    }
}
