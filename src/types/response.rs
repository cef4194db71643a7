//! Result types that travel back from the executor to callers.
//!
//! # Wire shapes
//!
//! ```text
//! OperationResult    {"op": "add_box", "status": "ok", "result": "B1"}
//!                    {"op": "nope", "status": "error", "message": "unsupported op"}
//! ExecutionResponse  {"status": "ok", "artifact": "preview_1.svg", "exportedArtifacts": [...]}
//!                    {"status": "error", "error": "line 3: NameError: ..."}
//! timeout            {"error": "timeout"}
//! ```

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Message recorded for operations naming an unknown capability.
pub const UNSUPPORTED_OP: &str = "unsupported op";

/// Outcome of one operation, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OpOutcome {
    /// The handler returned a value.
    Ok {
        /// The handler's return value.
        result: Value,
    },
    /// The handler failed or the operation was unknown.
    Error {
        /// Human-readable failure text.
        message: String,
    },
}

/// Per-operation result inside a batch response.
///
/// # Examples
///
/// ```
/// use scene_bridge::types::OperationResult;
/// use serde_json::json;
///
/// let ok = OperationResult::ok("add_box", json!("B1"));
/// assert_eq!(
///     serde_json::to_value(&ok).unwrap(),
///     json!({"op": "add_box", "status": "ok", "result": "B1"})
/// );
///
/// let unknown = OperationResult::unsupported("explode");
/// assert!(!unknown.is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// The operation name as submitted.
    pub op: String,
    /// Success value or failure message.
    #[serde(flatten)]
    pub outcome: OpOutcome,
}

impl OperationResult {
    /// A successful operation.
    pub fn ok(op: impl Into<String>, result: Value) -> Self {
        Self {
            op: op.into(),
            outcome: OpOutcome::Ok { result },
        }
    }

    /// A failed operation.
    pub fn error(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            outcome: OpOutcome::Error {
                message: message.into(),
            },
        }
    }

    /// An operation naming a capability the registry does not have.
    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::error(op, UNSUPPORTED_OP)
    }

    /// Whether the operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, OpOutcome::Ok { .. })
    }

    /// The failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            OpOutcome::Error { message } => Some(message),
            OpOutcome::Ok { .. } => None,
        }
    }
}

/// `ok` / `error` status of a script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Script ran and artifacts were produced.
    Ok,
    /// Script raised; no artifacts.
    Error,
}

/// Response to a script task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    /// Overall status.
    pub status: ResponseStatus,
    /// File name of the preview artifact inside the output directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// File names of exported models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_artifacts: Option<Vec<String>>,
    /// Failure text when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResponse {
    /// A successful run.
    pub fn ok(artifact: impl Into<String>, exported_artifacts: Vec<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            artifact: Some(artifact.into()),
            exported_artifacts: Some(exported_artifacts),
            error: None,
        }
    }

    /// A failed run.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            artifact: None,
            exported_artifacts: None,
            error: Some(error.into()),
        }
    }

    /// Whether the run succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// What the executor pushes onto the response queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskResponse {
    /// One result per operation, in submission order.
    Batch(Vec<OperationResult>),
    /// Result of a script task.
    Script(ExecutionResponse),
}

/// Result of a gateway call that waits on the executor.
///
/// `TimedOut` serializes as `{"error": "timeout"}`; `Completed` serializes as
/// the inner value.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    /// The executor answered within the deadline.
    Completed(T),
    /// The deadline passed first.
    TimedOut,
}

impl<T> CallOutcome<T> {
    /// Whether the call timed out.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::TimedOut => None,
        }
    }
}

impl<T: Serialize> Serialize for CallOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Completed(value) => value.serialize(serializer),
            Self::TimedOut => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", "timeout")?;
                map.end()
            },
        }
    }
}
