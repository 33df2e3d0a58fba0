// src/render/task.rs

use std::path::PathBuf;

use serde::Serialize;

use crate::errors::Result;
use crate::exec::ProcessOutcome;
use crate::types::{Quality, SessionId, TaskId, check_id};

/// One request to run a rendering script.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub task_id: TaskId,
    pub session_id: SessionId,
    /// Script text written verbatim (after placeholder rewriting) to disk.
    pub source_code: String,
    pub quality: Quality,
    pub timeout_secs: u64,
    /// Side-channel data written to `figure.txt` next to the script.
    pub aux_input: Option<String>,
}

impl RenderTask {
    /// Both ids become directory and file names under the output tree.
    pub fn check_ids(&self) -> Result<()> {
        check_id("session", &self.session_id)?;
        check_id("task", &self.task_id)
    }
}

/// How a render ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Succeeded,
    ProcessFailed,
    TimedOut,
    /// The renderer exited 0 but no media file was found.
    ArtifactNotFound,
}

/// Where the produced artifact went after rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamDelivery {
    /// Appended to the session's live stream.
    Live { manifest: PathBuf },
    /// Segmented into a standalone playlist.
    Detached { manifest: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderResult {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub status: RenderStatus,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_text: Option<String>,
    /// Last frames of the individual scenes when several were combined.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<StreamDelivery>,
}

impl RenderResult {
    /// Result skeleton carrying the raw process outcome.
    pub fn from_outcome(task: &RenderTask, outcome: ProcessOutcome) -> Self {
        let status = if outcome.timed_out {
            RenderStatus::TimedOut
        } else if outcome.exit_code != 0 {
            RenderStatus::ProcessFailed
        } else {
            RenderStatus::ArtifactNotFound
        };
        Self {
            task_id: task.task_id.clone(),
            session_id: task.session_id.clone(),
            status,
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            timed_out: outcome.timed_out,
            artifact_path: None,
            duration_seconds: None,
            subtitle_text: None,
            images: Vec::new(),
            thumbnail: None,
            delivery: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RenderStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> RenderTask {
        RenderTask {
            task_id: "t1".into(),
            session_id: "s1".into(),
            source_code: String::new(),
            quality: Quality::Low,
            timeout_secs: 5,
            aux_input: None,
        }
    }

    fn outcome(exit_code: i32, timed_out: bool) -> ProcessOutcome {
        ProcessOutcome {
            exit_code,
            stdout: String::new(),
            stderr: "boom".into(),
            timed_out,
        }
    }

    #[test]
    fn status_distinguishes_failure_timeout_and_missing_artifact() {
        assert_eq!(
            RenderResult::from_outcome(&task(), outcome(1, false)).status,
            RenderStatus::ProcessFailed
        );
        assert_eq!(
            RenderResult::from_outcome(&task(), outcome(124, true)).status,
            RenderStatus::TimedOut
        );
        assert_eq!(
            RenderResult::from_outcome(&task(), outcome(0, false)).status,
            RenderStatus::ArtifactNotFound
        );
    }

    #[test]
    fn serializes_without_empty_optionals() {
        let result = RenderResult::from_outcome(&task(), outcome(1, false));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "process_failed");
        assert_eq!(json["stderr"], "boom");
        assert!(json.get("artifact_path").is_none());
        assert!(json.get("images").is_none());
    }
}
