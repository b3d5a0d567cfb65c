#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use video_compressor::{Config, JobController, JobState, JobStateStore, MediaEngine};

const ENGINE_BANNER: &str = r#"
for last; do :; done
echo "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'input':" >&2
echo "  Duration: 00:01:40.00, start: 0.000000, bitrate: 1205 kb/s" >&2
printf 'frame=  100 fps=0.0 q=28.0 size=     256kB time=00:00:25.00 bitrate= 83.9kbits/s speed=50x\r' >&2
"#;

/// Shell scripts standing in for the transcoding engine.
pub struct FakeEngine;

impl FakeEngine {
    /// Reports progress up to 100%, writes the output file and exits 0.
    /// Every argument is recorded one per line in `args.txt` next to the script.
    pub fn succeeding(dir: &Path) -> PathBuf {
        let body = format!(
            r#"{ENGINE_BANNER}
printf '%s\n' "$@" > "{args}"
printf 'frame=  200 fps=0.0 q=28.0 size=     512kB time=00:00:50.00 bitrate= 83.9kbits/s speed=50x\r' >&2
printf 'frame=  400 fps=0.0 q=28.0 Lsize=   1024kB time=00:01:40.00 bitrate= 83.9kbits/s speed=50x\n' >&2
echo compressed > "$last"
exit 0
"#,
            args = dir.join("args.txt").display()
        );
        write_script(dir, "ffmpeg-ok", &body)
    }

    /// Reports some progress, then exits 1.
    pub fn failing(dir: &Path) -> PathBuf {
        let body = format!("{ENGINE_BANNER}\necho 'Conversion failed!' >&2\nexit 1\n");
        write_script(dir, "ffmpeg-fail", &body)
    }

    /// Reports 25% and then runs until signalled.
    pub fn hanging(dir: &Path) -> PathBuf {
        let body = format!("{ENGINE_BANNER}\nexec sleep 30\n");
        write_script(dir, "ffmpeg-hang", &body)
    }

    /// Like `hanging`, but ignores SIGTERM.
    pub fn stubborn(dir: &Path) -> PathBuf {
        let body = format!("trap '' TERM\n{ENGINE_BANNER}\nexec sleep 30\n");
        write_script(dir, "ffmpeg-stubborn", &body)
    }

    /// Reports 25%, closes its output and keeps running until signalled.
    pub fn detached(dir: &Path) -> PathBuf {
        let body = format!("{ENGINE_BANNER}\nexec >/dev/null 2>&1\nexec sleep 30\n");
        write_script(dir, "ffmpeg-detached", &body)
    }

    pub fn recorded_args(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("args.txt"))
            .expect("engine did not record its arguments")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A controller over a throwaway workspace.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["uploads", "compressed", "temp", "bin"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        Self { dir }
    }

    pub fn bin(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    pub fn uploads(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn compressed(&self) -> PathBuf {
        self.dir.path().join("compressed")
    }

    pub fn controller(&self, engine: &Path) -> JobController {
        JobController::new(
            MediaEngine::new(engine),
            JobStateStore::new(&self.dir.path().join("temp")),
            &self.uploads(),
            &self.compressed(),
            Duration::from_secs(1),
        )
    }

    pub fn upload_count(&self) -> usize {
        std::fs::read_dir(self.uploads()).unwrap().count()
    }
}

/// Poll `controller` until `accept` holds for the job state or `timeout` elapses.
pub async fn wait_for_state(
    controller: &JobController,
    timeout: Duration,
    accept: impl Fn(&JobState) -> bool,
) -> JobState {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let state = controller.query().await;
        if accept(&state) || tokio::time::Instant::now() >= deadline {
            return state;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Test harness running the HTTP server on a free port
pub struct TestServer {
    handle: JoinHandle<()>,
    port: u16,
    pub workspace: Workspace,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn start(engine: impl FnOnce(&Path) -> PathBuf) -> Self {
        let workspace = Workspace::new();
        let engine = engine(&workspace.bin());
        let port = portpicker::pick_unused_port().expect("No available port");

        let config = Config {
            listen_on_port: port,
            workspace: workspace.dir.path().display().to_string(),
            ffmpeg: engine.display().to_string(),
            cancel_grace_secs: 1,
            ..Default::default()
        };

        let handle = tokio::spawn(async move {
            video_compressor::run(config).await.expect("server failed");
        });

        let client = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();

        // Poll until server is ready
        for _ in 0..200 {
            if let Ok(response) = client
                .get(format!("http://127.0.0.1:{port}/progress"))
                .send()
                .await
                && response.status().is_success()
            {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        Self {
            handle,
            port,
            workspace,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn post(&self, path: &str) -> reqwest::Response {
        self.client.post(self.url(path)).send().await.unwrap()
    }

    pub async fn compress(&self, form: reqwest::multipart::Form) -> reqwest::Response {
        self.client
            .post(self.url("/compress"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn video_form(filename: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(b"not really a video".to_vec())
        .file_name(filename.to_string());
    reqwest::multipart::Form::new().part("file", part)
}
