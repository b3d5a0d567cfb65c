use crate::Config;
use crate::engine::MediaEngine;
use crate::job::{JobController, JobStateStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const TEMP_DIR: &str = "temp";
const UPLOADS_DIR: &str = "uploads";
const COMPRESSED_DIR: &str = "compressed";

async fn init_workspace(workspace: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(workspace.join(TEMP_DIR)).await?;
    tokio::fs::create_dir_all(workspace.join(UPLOADS_DIR)).await?;
    tokio::fs::create_dir_all(workspace.join(COMPRESSED_DIR)).await?;
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<JobController>,

    pub temp_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub compressed_dir: PathBuf,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let workspace = PathBuf::from(&config.workspace);
        init_workspace(&workspace).await?;

        let temp_dir = workspace.join(TEMP_DIR);
        let uploads_dir = workspace.join(UPLOADS_DIR);
        let compressed_dir = workspace.join(COMPRESSED_DIR);

        let engine = MediaEngine::new(&config.ffmpeg);
        match engine.locate() {
            Some(path) => info!(engine = %path.display(), "Using transcoding engine"),
            None => warn!(
                engine = %engine.program().display(),
                "Transcoding engine not found, jobs will fail until it is installed"
            ),
        }

        let controller = JobController::new(
            engine,
            JobStateStore::new(&temp_dir),
            &uploads_dir,
            &compressed_dir,
            config.cancel_grace(),
        );

        Ok(Self {
            controller: Arc::new(controller),
            temp_dir,
            uploads_dir,
            compressed_dir,
        })
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.as_path()
    }

    pub fn uploads_dir(&self) -> &Path {
        self.uploads_dir.as_path()
    }

    pub fn compressed_dir(&self) -> &Path {
        self.compressed_dir.as_path()
    }
}
