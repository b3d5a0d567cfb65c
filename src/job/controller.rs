use crate::engine::{EngineProcess, FfmpegCommand, MediaEngine, ProgressParser};
use crate::job::{ENGINE_FAILURE, JobError, JobState, JobStateStore};
use crate::params::{CompressParams, EncodeParams};
use anyhow::Context as _;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];
pub const OUTPUT_SUFFIX: &str = "_compressed";

/// Extra time a canceller waits for the job task on top of the grace period.
const CANCEL_ACK_SLACK: Duration = Duration::from_secs(2);

/// An uploaded input file.
#[derive(Clone, Debug)]
pub struct Upload {
    pub filename: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Acknowledgment returned by [`JobController::submit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobTicket {
    pub job_id: String,
    pub output: String,
}

/// The live job: a channel into the task that owns the engine process.
struct JobSession {
    job_id: String,
    cancel_tx: oneshot::Sender<oneshot::Sender<()>>,
}

/// Runs one compression job at a time.
pub struct JobController {
    engine: MediaEngine,
    store: JobStateStore,
    uploads_dir: PathBuf,
    compressed_dir: PathBuf,
    grace: Duration,
    running: TokioMutex<()>,
    session: TokioMutex<Option<JobSession>>,
}

impl JobController {
    pub fn new(
        engine: MediaEngine,
        store: JobStateStore,
        uploads_dir: &Path,
        compressed_dir: &Path,
        grace: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            uploads_dir: uploads_dir.to_path_buf(),
            compressed_dir: compressed_dir.to_path_buf(),
            grace,
            running: TokioMutex::new(()),
            session: TokioMutex::new(None),
        }
    }

    /// Validate, run the job to completion and record its outcome.
    ///
    /// Only validation and busy errors are returned; engine and IO failures
    /// end up in the stored job state.
    pub async fn submit(
        &self,
        upload: Option<Upload>,
        params: &CompressParams,
    ) -> Result<JobTicket, JobError> {
        let upload = upload.ok_or_else(|| JobError::Validation("No file selected".into()))?;
        let filename = base_name(&upload.filename);
        if filename.is_empty() {
            return Err(JobError::Validation("No file selected".into()));
        }
        if !allowed_file(filename) {
            return Err(JobError::Validation("Unsupported format".into()));
        }
        let encode = params.resolve().map_err(JobError::Validation)?;

        let Ok(_running) = self.running.try_lock() else {
            return Err(JobError::Busy);
        };

        let job_id = Uuid::new_v4().simple().to_string();
        let input_path = self.uploads_dir.join(format!("{job_id}_{filename}"));
        let output = output_filename(filename);
        let output_path = self.compressed_dir.join(&output);
        info!(%job_id, %filename, %output, "Compression job started");

        self.record(&job_id, JobState::started()).await;

        let result = self
            .execute(&job_id, &upload.data, &input_path, &output_path, &encode)
            .await;
        self.session.lock().await.take();

        let state = match result {
            Ok(status) if status.success() => {
                info!(%job_id, %output, "Compression job completed");
                JobState::completed(output.clone())
            }
            Ok(status) => {
                warn!(%job_id, %status, "Engine exited unsuccessfully");
                JobState::failed(ENGINE_FAILURE)
            }
            Err(error) => {
                error!(%job_id, ?error, "Compression job failed");
                JobState::failed(format!("{error:#}"))
            }
        };
        self.record(&job_id, state).await;

        match tokio::fs::remove_file(&input_path).await {
            Ok(()) => debug!(%job_id, path = %input_path.display(), "Removed upload"),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!(%job_id, ?error, "Failed to remove upload"),
        }

        Ok(JobTicket { job_id, output })
    }

    async fn execute(
        &self,
        job_id: &str,
        data: &[u8],
        input_path: &Path,
        output_path: &Path,
        encode: &EncodeParams,
    ) -> anyhow::Result<ExitStatus> {
        tokio::fs::write(input_path, data)
            .await
            .with_context(|| format!("failed to save upload {}", input_path.display()))?;

        let cmd = FfmpegCommand::compress(encode, input_path, output_path);
        let mut process = self.engine.spawn(&cmd)?;
        debug!(job_id, pid = ?process.id(), "Engine running");

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *self.session.lock().await = Some(JobSession {
            job_id: job_id.to_string(),
            cancel_tx,
        });

        Ok(self.drive(job_id, &mut process, cancel_rx).await?)
    }

    /// Feed engine output to the parser and wait for the engine to exit.
    ///
    /// At most one cancel request is served, whether it arrives while output is
    /// still flowing or after the engine closed its output but kept running.
    async fn drive(
        &self,
        job_id: &str,
        process: &mut EngineProcess,
        mut cancel_rx: oneshot::Receiver<oneshot::Sender<()>>,
    ) -> std::io::Result<ExitStatus> {
        let mut parser = ProgressParser::new();
        let mut cancellable = true;

        loop {
            tokio::select! {
                line = process.next_line() => {
                    let Some(line) = line else {
                        break;
                    };
                    if let Some(progress) = parser.feed(&line) {
                        debug!(job_id, progress, "Progress");
                        self.record(job_id, JobState::running(progress)).await;
                    }
                }
                request = &mut cancel_rx, if cancellable => {
                    cancellable = false;
                    if let Ok(ack) = request {
                        self.stop(job_id, process, ack).await;
                    }
                }
            }
        }

        if !cancellable {
            return process.wait().await;
        }
        debug!(job_id, "Engine output closed, waiting for exit");
        tokio::select! {
            status = process.wait() => status,
            request = &mut cancel_rx => {
                if let Ok(ack) = request {
                    self.stop(job_id, process, ack).await;
                }
                process.wait().await
            }
        }
    }

    async fn stop(&self, job_id: &str, process: &mut EngineProcess, ack: oneshot::Sender<()>) {
        match process.terminate(self.grace).await {
            Ok(status) => info!(job_id, %status, "Engine terminated"),
            Err(error) => error!(job_id, ?error, "Failed to terminate engine"),
        }
        _ = ack.send(());
    }

    /// Current job state.
    pub async fn query(&self) -> JobState {
        self.store.read().await
    }

    /// Stop the running engine, if any. Returns whether a job was interrupted.
    pub async fn cancel(&self) -> bool {
        let Some(session) = self.session.lock().await.take() else {
            debug!("No running job to cancel");
            return false;
        };

        let JobSession { job_id, cancel_tx } = session;
        let (ack_tx, ack_rx) = oneshot::channel();
        if cancel_tx.send(ack_tx).is_err() {
            debug!(%job_id, "Job already finished");
            return false;
        }

        info!(%job_id, "Cancelling job");
        match tokio::time::timeout(self.grace + CANCEL_ACK_SLACK, ack_rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                debug!(%job_id, "Job ended before handling cancel");
                false
            }
            Err(_) => {
                warn!(%job_id, "Timed out waiting for job to stop");
                true
            }
        }
    }

    /// Path of a finished output file, if it exists.
    pub async fn retrieve(&self, filename: &str) -> Option<PathBuf> {
        // a single plain path component, so nothing outside the output directory
        let mut components = Path::new(filename).components();
        if filename.contains(['/', '\\'])
            || !matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            )
        {
            return None;
        }

        let path = self.compressed_dir.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Some(path),
            _ => None,
        }
    }

    async fn record(&self, job_id: &str, state: JobState) {
        if let Err(error) = self.store.write(&state).await {
            warn!(job_id, ?error, status = ?state.status, "Failed to persist job state");
        }
    }
}

/// Last path component of a client-supplied filename.
pub fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or_default().trim()
}

pub fn allowed_file(filename: &str) -> bool {
    filename.rsplit_once('.').is_some_and(|(_, ext)| {
        ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// `clip.mov` -> `clip_compressed.mov`
pub fn output_filename(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    }
}
