//! Generation status record exposed to polling clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the most recent script call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Nothing submitted yet.
    #[default]
    Idle,
    /// A script was submitted and the gateway is waiting on it.
    Running,
    /// The last script produced an artifact.
    Done,
    /// The last script was rejected, failed, or timed out.
    Error,
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of what the gateway last observed about script generation.
///
/// `lastUpdated` is a Unix timestamp in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    /// Current status.
    pub status: GenerationStatus,
    /// Preview artifact of the last successful run.
    pub artifact_name: Option<String>,
    /// When the record last changed.
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Failure text of the last failed run.
    pub error: Option<String>,
    /// Exported model files of the last successful run.
    pub exported_artifacts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn idle_state_wire_shape() {
        let value = serde_json::to_value(GenerationState::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "idle",
                "artifactName": null,
                "lastUpdated": null,
                "error": null,
                "exportedArtifacts": []
            })
        );
    }

    #[test]
    fn timestamp_is_seconds() {
        let state = GenerationState {
            status: GenerationStatus::Done,
            artifact_name: Some("preview_1.svg".to_string()),
            last_updated: Utc.timestamp_opt(1_700_000_000, 0).single(),
            error: None,
            exported_artifacts: vec!["model_1.obj".to_string()],
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["lastUpdated"], json!(1_700_000_000));
        assert_eq!(value["status"], json!("done"));
    }
}
