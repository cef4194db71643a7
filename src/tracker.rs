//! Process-wide record of the latest script generation.
//!
//! Only the gateway writes here. Readers get a cloned snapshot, which is what
//! the gateway last observed and not necessarily what the executor is doing
//! right now.

use chrono::Utc;
use parking_lot::RwLock;

use crate::types::{GenerationState, GenerationStatus};

#[derive(Debug, Default)]
pub struct GenerationTracker {
    state: RwLock<GenerationState>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A script was submitted. Clears the previous error.
    pub fn mark_running(&self) {
        let mut state = self.state.write();
        state.status = GenerationStatus::Running;
        state.error = None;
        state.last_updated = Some(Utc::now());
    }

    /// A script finished with a preview artifact.
    pub fn mark_done(&self, artifact: impl Into<String>, exported: Vec<String>) {
        let mut state = self.state.write();
        state.status = GenerationStatus::Done;
        state.artifact_name = Some(artifact.into());
        state.exported_artifacts = exported;
        state.error = None;
        state.last_updated = Some(Utc::now());
    }

    /// A script was rejected, failed, or timed out.
    pub fn mark_error(&self, message: impl Into<String>) {
        let mut state = self.state.write();
        state.status = GenerationStatus::Error;
        state.error = Some(message.into());
        state.last_updated = Some(Utc::now());
    }

    pub fn snapshot(&self) -> GenerationState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let snapshot = GenerationTracker::new().snapshot();
        assert_eq!(snapshot.status, GenerationStatus::Idle);
        assert!(snapshot.last_updated.is_none());
    }

    #[test]
    fn lifecycle() {
        let tracker = GenerationTracker::new();
        tracker.mark_running();
        assert_eq!(tracker.snapshot().status, GenerationStatus::Running);

        tracker.mark_done("preview_1.svg", vec!["model_1.gltf".into(), "model_1.obj".into()]);
        let done = tracker.snapshot();
        assert_eq!(done.status, GenerationStatus::Done);
        assert_eq!(done.artifact_name.as_deref(), Some("preview_1.svg"));
        assert_eq!(done.exported_artifacts.len(), 2);

        tracker.mark_error("timeout");
        let failed = tracker.snapshot();
        assert_eq!(failed.status, GenerationStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("timeout"));
        // the last good artifact stays visible
        assert_eq!(failed.artifact_name.as_deref(), Some("preview_1.svg"));

        tracker.mark_running();
        assert!(tracker.snapshot().error.is_none());
    }
}
