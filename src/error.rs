//! Error types for the bridge.
//!
//! [`BridgeError`] is the crate-level error. Failures that belong to a single
//! capability call or a single script run are not errors at this level: the
//! executor converts them into [`OperationResult`](crate::types::OperationResult)
//! and [`ExecutionResponse`](crate::types::ExecutionResponse) values so that
//! the tick loop and the gateway keep running.

use thiserror::Error;

use crate::config::ConfigError;
use crate::sanitizer::Rejection;
use crate::types::TaskId;

/// JSON-RPC code used for sanitizer rejections.
pub const SCRIPT_REJECTED_CODE: i32 = -32001;

/// Errors surfaced by the bridge to its callers.
///
/// Use [`error_code`](BridgeError::error_code) to map a variant to the
/// JSON-RPC error code sent on the wire.
///
/// # Examples
///
/// ```
/// use scene_bridge::BridgeError;
///
/// let err = BridgeError::MethodNotFound("frobnicate".to_string());
/// assert_eq!(err.error_code(), -32601);
/// assert!(err.to_string().contains("frobnicate"));
/// ```
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Code was rejected by the sanitizer before it was enqueued.
    #[error("script rejected by sanitizer: {0}")]
    Rejected(#[from] Rejection),

    /// The body was JSON but not a JSON-RPC request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request parameters did not match the method's shape.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The requested RPC method does not exist.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The executor thread is gone; no task can make progress.
    #[error("executor is not running")]
    ExecutorStopped,

    /// A correlated response had the wrong shape for the task that produced it.
    #[error("unexpected response kind for task {task_id}")]
    UnexpectedResponse {
        /// The task whose response was malformed.
        task_id: TaskId,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O failure in a transport or at start-up.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else that should not happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Maps this error to a JSON-RPC error code.
    ///
    /// - `-32001`: sanitizer rejection
    /// - `-32700`: unparseable JSON
    /// - `-32600`: not a JSON-RPC request
    /// - `-32601`: unknown method
    /// - `-32602`: invalid params
    /// - `-32603`: everything else
    pub fn error_code(&self) -> i32 {
        match self {
            Self::Rejected(_) => SCRIPT_REJECTED_CODE,
            Self::Json(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::ExecutorStopped
            | Self::UnexpectedResponse { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => -32603,
        }
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
