//! The two channels between the gateway and the executor.
//!
//! [`TaskQueue`] carries work to the executor in FIFO order. [`ResponseQueue`]
//! carries results back, keyed by task id, so concurrent callers each pick up
//! their own response. A caller that gives up abandons its id; a response
//! that arrives for an abandoned id is dropped.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::types::{Task, TaskId, TaskResponse};

/// Unbounded FIFO of pending tasks. Many producers, one consumer.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task.
    pub fn push(&self, task: Task) {
        self.inner.lock().push_back(task);
    }

    /// Take the oldest task, if any. Never blocks on an empty queue.
    pub fn try_pop(&self) -> Option<Task> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[derive(Debug)]
enum Slot {
    Ready(TaskResponse),
    Abandoned,
}

/// What happened to a pushed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stored for the waiting caller.
    Delivered,
    /// The caller had already given up; the response was dropped.
    Discarded,
}

/// Completed responses keyed by task id.
#[derive(Debug, Default)]
pub struct ResponseQueue {
    slots: Mutex<HashMap<TaskId, Slot>>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the response for `id` unless its caller abandoned it.
    pub fn push(&self, id: TaskId, response: TaskResponse) -> Delivery {
        let mut slots = self.slots.lock();
        if matches!(slots.get(&id), Some(Slot::Abandoned)) {
            slots.remove(&id);
            return Delivery::Discarded;
        }
        slots.insert(id, Slot::Ready(response));
        Delivery::Delivered
    }

    /// Take the response for `id` if it has arrived.
    pub fn try_take(&self, id: TaskId) -> Option<TaskResponse> {
        let mut slots = self.slots.lock();
        match slots.remove(&id) {
            Some(Slot::Ready(response)) => Some(response),
            Some(Slot::Abandoned) => {
                slots.insert(id, Slot::Abandoned);
                None
            },
            None => None,
        }
    }

    /// Give up on `id`. A response already stored is dropped now; one that
    /// arrives later is dropped on arrival.
    pub fn abandon(&self, id: TaskId) {
        let mut slots = self.slots.lock();
        if let Some(Slot::Ready(_)) = slots.remove(&id) {
            return;
        }
        slots.insert(id, Slot::Abandoned);
    }

    /// Drop whatever is held for `id` without leaving a marker. For callers
    /// that know no response will ever arrive.
    pub fn forget(&self, id: TaskId) {
        self.slots.lock().remove(&id);
    }

    /// Remove every abandoned marker and return how many there were. Called
    /// once the executor has stopped and nothing more can arrive.
    pub fn prune_abandoned(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| !matches!(slot, Slot::Abandoned));
        before - slots.len()
    }

    /// Number of abandoned ids still waiting for a late response.
    pub fn abandoned(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Abandoned))
            .count()
    }

    /// Number of ready responses nobody has taken yet.
    pub fn pending(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionResponse, OperationBatch, OperationResult};
    use serde_json::json;

    fn batch_response(tag: &str) -> TaskResponse {
        TaskResponse::Batch(vec![OperationResult::ok(tag, json!(tag))])
    }

    #[test]
    fn tasks_are_fifo() {
        let queue = TaskQueue::new();
        let first = Task::operations(OperationBatch::default());
        let second = Task::operations(OperationBatch::default());
        let (a, b) = (first.id(), second.id());
        queue.push(first);
        queue.push(second);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop().map(|t| t.id()), Some(a));
        assert_eq!(queue.try_pop().map(|t| t.id()), Some(b));
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn responses_are_matched_by_id() {
        let queue = ResponseQueue::new();
        let (a, b) = (TaskId::new(), TaskId::new());
        assert_eq!(queue.push(b, batch_response("b")), Delivery::Delivered);
        assert!(queue.try_take(a).is_none());
        let late = TaskResponse::Script(ExecutionResponse::failed("x"));
        assert_eq!(queue.push(a, late), Delivery::Delivered);
        assert!(matches!(queue.try_take(a), Some(TaskResponse::Script(_))));
        assert!(matches!(queue.try_take(b), Some(TaskResponse::Batch(_))));
        assert!(queue.try_take(b).is_none());
    }

    #[test]
    fn late_responses_are_discarded() {
        let queue = ResponseQueue::new();
        let id = TaskId::new();
        queue.abandon(id);
        assert!(queue.try_take(id).is_none());
        assert_eq!(queue.push(id, batch_response("late")), Delivery::Discarded);
        assert!(queue.try_take(id).is_none());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn abandoning_a_ready_response_drops_it() {
        let queue = ResponseQueue::new();
        let id = TaskId::new();
        queue.push(id, batch_response("ready"));
        queue.abandon(id);
        assert!(queue.try_take(id).is_none());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn abandoned_markers_are_pruned_and_forgotten() {
        let queue = ResponseQueue::new();
        let (late, never, ready) = (TaskId::new(), TaskId::new(), TaskId::new());
        queue.abandon(late);
        queue.abandon(never);
        queue.push(ready, batch_response("ready"));
        assert_eq!(queue.abandoned(), 2);

        assert_eq!(queue.push(late, batch_response("late")), Delivery::Discarded);
        assert_eq!(queue.abandoned(), 1);

        assert_eq!(queue.prune_abandoned(), 1);
        assert_eq!(queue.abandoned(), 0);
        assert_eq!(queue.pending(), 1);

        queue.forget(ready);
        assert_eq!(queue.pending(), 0);
        queue.forget(TaskId::new());
    }
}
