pub mod controller;
pub mod store;

pub use controller::{JobController, JobTicket, Upload};
pub use store::JobStateStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message recorded when the engine exits unsuccessfully.
pub const ENGINE_FAILURE: &str = "FFmpeg error";

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    #[default]
    Idle,
    InProgress,
    Completed,
    Failed,
}

/// Externally observable state of the current job.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct JobState {
    pub progress: u8,
    pub status: JobStatus,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn started() -> Self {
        Self::running(0)
    }

    pub fn running(progress: u8) -> Self {
        Self {
            progress: progress.min(100),
            status: JobStatus::InProgress,
            ..Default::default()
        }
    }

    pub fn completed(file: impl Into<String>) -> Self {
        Self {
            progress: 100,
            status: JobStatus::Completed,
            file: Some(file.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            progress: 0,
            status: JobStatus::Failed,
            file: None,
            error: Some(error.into()),
        }
    }
}

/// Errors returned to the submitter; everything else is recorded in the job state.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("A compression job is already running")]
    Busy,
}
