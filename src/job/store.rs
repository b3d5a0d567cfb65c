use crate::job::JobState;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

pub const STATE_FILE: &str = "progress.json";

/// Single-slot persisted job state.
///
/// Writers are serialized and publish through a rename, so a reader sees
/// either the previous snapshot or the new one. Readers take no lock.
#[derive(Debug)]
pub struct JobStateStore {
    path: PathBuf,
    write_lock: TokioMutex<()>,
}

impl JobStateStore {
    pub fn new(temp_dir: &Path) -> Self {
        Self {
            path: temp_dir.join(STATE_FILE),
            write_lock: TokioMutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored snapshot.
    pub async fn write(&self, state: &JobState) -> anyhow::Result<()> {
        let content = serde_json::to_vec(state)?;
        let staging = self.path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    /// Latest snapshot, or the idle state when nothing readable is stored.
    pub async fn read(&self) -> JobState {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No job state stored yet");
                return JobState::idle();
            }
            Err(error) => {
                warn!(?error, path = %self.path.display(), "Failed to read job state");
                return JobState::idle();
            }
        };

        serde_json::from_slice(&content).unwrap_or_else(|error| {
            warn!(?error, path = %self.path.display(), "Failed to parse job state");
            JobState::idle()
        })
    }
}
