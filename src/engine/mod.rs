//! External media engine adapter.
//!
//! Launches the engine as a child process and exposes its stdout and stderr
//! as one merged stream of lines.

pub mod command;
pub mod progress;

pub use command::FfmpegCommand;
pub use progress::ProgressParser;

use bytes::BytesMut;
use futures::stream::BoxStream;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch {program}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("engine process error: {0}")]
    Io(#[from] io::Error),
}

/// Handle on the configured engine binary.
#[derive(Debug, Clone)]
pub struct MediaEngine {
    program: PathBuf,
}

impl MediaEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Resolve the program on `PATH`, if it can be found there.
    pub fn locate(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    /// Start one engine process running `cmd`.
    pub fn spawn(&self, cmd: &FfmpegCommand) -> Result<EngineProcess, EngineError> {
        let args = cmd.build_args();
        debug!(program = %self.program.display(), args = %args.join(" "), "Launching engine");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("engine stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("engine stderr not captured"))?;

        let merged = FramedRead::new(stdout, LineCodec)
            .merge(FramedRead::new(stderr, LineCodec))
            .filter_map(|line| {
                line.inspect_err(|error| debug!(%error, "Engine output read failed"))
                    .ok()
            });

        Ok(EngineProcess {
            child,
            lines: Box::pin(merged),
        })
    }
}

/// A running engine process and its merged output.
pub struct EngineProcess {
    child: Child,
    lines: BoxStream<'static, String>,
}

impl EngineProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next output line; `None` once both output streams are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.next().await
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process to stop, forcing it after `grace`.
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        if let Some(pid) = self.child.id()
            && request_stop(pid)
        {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => return status,
                Err(_) => warn!(
                    pid,
                    grace_ms = grace.as_millis() as u64,
                    "Engine still running after grace period, killing"
                ),
            }
        }

        self.child.kill().await?;
        self.child.wait().await
    }
}

#[cfg(unix)]
fn request_stop(pid: u32) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .inspect_err(|error| warn!(pid, %error, "Failed to send SIGTERM"))
        .is_ok()
}

#[cfg(not(unix))]
fn request_stop(_pid: u32) -> bool {
    false
}

/// Splits engine output on `\n` and `\r`; the status line is redrawn with carriage returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        while let Some(at) = buf.iter().position(|b| matches!(b, b'\n' | b'\r')) {
            let line = buf.split_to(at + 1);
            if at == 0 {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(&line[..at]).into_owned()));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}
