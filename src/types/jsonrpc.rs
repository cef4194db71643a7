//! JSON-RPC 2.0 envelope types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// An incoming JSON-RPC request or notification.
///
/// A request without `id` is a notification and gets no response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Positional (array) or named (object) parameters.
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Build a request with a numeric id.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::from(id)),
            method: method.into(),
            params,
        }
    }

    /// Whether this is a notification.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Error object of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short description.
    pub message: String,
    /// Extra structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&BridgeError> for JsonRpcError {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::Rejected(rejection) => Self {
                code: err.error_code(),
                message: "script rejected by sanitizer".to_string(),
                data: Some(serde_json::json!({ "reason": rejection.reason() })),
            },
            _ => Self {
                code: err.error_code(),
                message: err.to_string(),
                data: None,
            },
        }
    }
}

/// Either a result or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    /// Successful call.
    Result(Value),
    /// Failed call.
    Error(JsonRpcError),
}

/// An outgoing JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echo of the request id (`null` when it could not be read).
    pub id: Value,
    /// Result or error.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// A success response.
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    /// An error response built from a bridge error.
    pub fn error(id: Value, err: &BridgeError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(JsonRpcError::from(err)),
        }
    }

    /// The result value, if the call succeeded.
    pub fn as_result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }

    /// The error object, if the call failed.
    pub fn as_error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Error(err) => Some(err),
            ResponsePayload::Result(_) => None,
        }
    }
}
