pub mod api;
pub mod app_state;
pub mod config;
pub mod engine;
pub mod job;
pub mod params;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

//
// Re-export
//
pub use app_state::AppState;
pub use config::Config;
pub use engine::{FfmpegCommand, MediaEngine, ProgressParser};
pub use job::{JobController, JobError, JobState, JobStateStore, JobStatus, Upload};
pub use params::{CompressParams, EncodeParams, Scale};

/// Build the HTTP surface around an initialised state.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api::index))
        .route("/compress", post(api::compress))
        .route("/progress", get(api::progress))
        .route("/cancel", post(api::cancel))
        .route("/download/{filename}", get(api::download))
        .method_not_allowed_fallback(api::redirect_to_index)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(axum::middleware::from_fn(api::log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(&config).await?;
    info!(
        uploads = %state.uploads_dir().display(),
        compressed = %state.compressed_dir().display(),
        temp = %state.temp_dir().display(),
        "Workspace ready"
    );

    let app = router(state, config.max_upload_bytes());

    let addr = format!("0.0.0.0:{}", config.listen_on_port);
    info!("Listening on http://{addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
