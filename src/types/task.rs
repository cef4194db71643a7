//! Task types: the unit of work handed to the executor.
//!
//! A [`Task`] is either an [`OperationBatch`] or a sanitized script. The
//! script variant holds a [`SanitizedScript`], which only the
//! [`Sanitizer`](crate::sanitizer::Sanitizer) can construct, so unvalidated
//! code cannot reach the task queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::sanitizer::SanitizedScript;

/// Parameters passed to a capability handler.
pub type Params = Map<String, Value>;

/// Correlation identifier linking a task to its response.
///
/// # Examples
///
/// ```
/// use scene_bridge::TaskId;
///
/// let a = TaskId::new();
/// let b = TaskId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single named operation inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Capability name, e.g. `add_box`.
    pub op: String,
    /// Handler parameters.
    #[serde(default)]
    pub params: Params,
}

impl Operation {
    /// Create an operation from a name and a JSON object of parameters.
    ///
    /// Non-object `params` values are treated as empty.
    pub fn new(op: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Params::new(),
        };
        Self {
            op: op.into(),
            params,
        }
    }
}

/// An ordered list of operations submitted in one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationBatch {
    /// Operations in submission order.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl OperationBatch {
    /// Create a batch from a list of operations.
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Payload of a task.
#[derive(Debug)]
pub enum TaskKind {
    /// Structured operations run against the capability registry.
    OperationBatch(OperationBatch),
    /// Code that passed the sanitizer.
    RawCode(SanitizedScript),
}

/// A unit of work for the executor.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    submitted_at: DateTime<Utc>,
}

impl Task {
    /// Create a batch task with a fresh correlation id.
    pub fn operations(batch: OperationBatch) -> Self {
        Self::with_kind(TaskKind::OperationBatch(batch))
    }

    /// Create a script task with a fresh correlation id.
    pub fn script(script: SanitizedScript) -> Self {
        Self::with_kind(TaskKind::RawCode(script))
    }

    fn with_kind(kind: TaskKind) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            submitted_at: Utc::now(),
        }
    }

    /// The task's correlation id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The task's payload.
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// When the gateway created the task.
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self.kind {
            TaskKind::OperationBatch(_) => "ops",
            TaskKind::RawCode(_) => "script",
        }
    }

    /// Split the task into its id and payload.
    pub fn into_parts(self) -> (TaskId, TaskKind) {
        (self.id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_deserializes_from_wire_shape() {
        let batch: OperationBatch = serde_json::from_value(json!({
            "operations": [
                {"op": "add_box", "params": {"name": "B1", "size": [2, 2, 2]}},
                {"op": "reset"}
            ]
        }))
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.operations[0].op, "add_box");
        assert_eq!(batch.operations[0].params["name"], json!("B1"));
        assert!(batch.operations[1].params.is_empty());
    }

    #[test]
    fn missing_operations_is_empty_batch() {
        let batch: OperationBatch = serde_json::from_value(json!({})).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn operation_new_ignores_non_object_params() {
        let op = Operation::new("reset", json!([1, 2]));
        assert!(op.params.is_empty());
    }

    #[test]
    fn tasks_get_distinct_ids() {
        let a = Task::operations(OperationBatch::default());
        let b = Task::operations(OperationBatch::default());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.label(), "ops");
    }
}
