use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure that can be loaded from CLI or a config file
///
/// Example configuration file content
/// # Video Compressor Configuration
///
/// listen_on_port = 5000
/// workspace = "./data"
///
/// # Engine
/// ffmpeg = "/usr/bin/ffmpeg"
/// cancel_grace_secs = 3
///
/// # Largest accepted upload, in megabytes
/// max_upload_mb = 2048
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Working directory holding uploads, compressed outputs and job state
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Transcoding engine executable
    #[arg(long, default_value = "ffmpeg")]
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// Seconds to wait after asking the engine to stop before killing it
    #[arg(long, default_value_t = 3)]
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,

    /// Largest accepted upload in megabytes
    #[arg(long, default_value_t = 2048)]
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Configuration file path
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            workspace: default_workspace(),
            ffmpeg: default_ffmpeg(),
            cancel_grace_secs: default_cancel_grace_secs(),
            max_upload_mb: default_max_upload_mb(),
            config: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.ffmpeg == default_ffmpeg() {
            self.ffmpeg = file_config.ffmpeg;
        }
        if self.cancel_grace_secs == default_cancel_grace_secs() {
            self.cancel_grace_secs = file_config.cancel_grace_secs;
        }
        if self.max_upload_mb == default_max_upload_mb() {
            self.max_upload_mb = file_config.max_upload_mb;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ffmpeg.trim().is_empty() {
            return Err(anyhow::anyhow!("Engine executable cannot be empty"));
        }
        if self.workspace.trim().is_empty() {
            return Err(anyhow::anyhow!("Workspace cannot be empty"));
        }
        if self.cancel_grace_secs == 0 {
            return Err(anyhow::anyhow!("Cancel grace period must be at least 1 second"));
        }
        if self.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Upload limit must be at least 1 MB"));
        }
        Ok(())
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

// Default value functions
fn default_port() -> u16 {
    5000
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_cancel_grace_secs() -> u64 {
    3
}

fn default_max_upload_mb() -> usize {
    2048
}
