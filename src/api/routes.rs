use crate::AppState;
use crate::job::{JobError, JobState, Upload};
use crate::params::CompressParams;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Extension, Multipart, Path as AxumPath};
use axum::http::{HeaderValue, Response, StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Redirect};
use mime_guess::from_path;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for JobError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            JobError::Validation(_) => StatusCode::BAD_REQUEST,
            JobError::Busy => StatusCode::CONFLICT,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Any route hit with the wrong method lands back on the upload page.
pub async fn redirect_to_index() -> Redirect {
    Redirect::to("/")
}

fn multipart_error(error: MultipartError) -> axum::response::Response {
    warn!(%error, "Failed to read upload form");
    (
        error.status(),
        Json(ErrorResponse {
            error: error.body_text(),
        }),
    )
        .into_response()
}

/// Runs a compression job to completion and acknowledges it.
#[axum::debug_handler]
pub async fn compress(
    Extension(state): Extension<AppState>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let mut upload = None;
    let mut params = CompressParams::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return multipart_error(error),
        };
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            match field.bytes().await {
                Ok(data) => upload = Some(Upload::new(filename, data)),
                Err(error) => return multipart_error(error),
            }
        } else {
            match field.text().await {
                Ok(value) => params.set(&name, value),
                Err(error) => return multipart_error(error),
            }
        }
    }

    // the job keeps running even if the client goes away
    let controller = state.controller.clone();
    let job = tokio::spawn(async move { controller.submit(upload, &params).await });

    match job.await {
        Ok(Ok(ticket)) => {
            debug!(job_id = %ticket.job_id, output = %ticket.output, "Job finished");
            (StatusCode::OK, StatusResponse::new("started")).into_response()
        }
        Ok(Err(error)) => {
            info!(%error, "Compression request rejected");
            error.into_response()
        }
        Err(error) => {
            error!(?error, "Compression task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Compression task aborted".into(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn progress(Extension(state): Extension<AppState>) -> Json<JobState> {
    Json(state.controller.query().await)
}

pub async fn cancel(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let interrupted = state.controller.cancel().await;
    debug!(interrupted, "Cancel request handled");
    (StatusCode::OK, StatusResponse::new("canceled"))
}

pub async fn download(
    Extension(state): Extension<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> Response<Body> {
    let Some(path) = state.controller.retrieve(&filename).await else {
        debug!(%filename, "Requested output not found");
        return file_not_found();
    };
    let Ok(file) = tokio::fs::File::open(&path).await else {
        return file_not_found();
    };
    let size = file.metadata().await.ok().map(|metadata| metadata.len());

    let mut res = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = res.headers_mut();
    if let Ok(content_type) = HeaderValue::from_str(from_path(&path).first_or_octet_stream().as_ref()) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&filename));
    if let Some(size) = size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    res
}

/// `attachment` with an ASCII `filename` fallback and the exact name as RFC 5987 `filename*`.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    let disposition = format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    );
    HeaderValue::from_str(&disposition).unwrap_or(HeaderValue::from_static("attachment"))
}

fn file_not_found() -> Response<Body> {
    let mut res = Response::new(Body::from("File not found"));
    *res.status_mut() = StatusCode::NOT_FOUND;
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii_name() {
        assert_eq!(
            content_disposition("trip_compressed.mp4"),
            "attachment; filename=\"trip_compressed.mp4\"; filename*=UTF-8''trip_compressed.mp4"
        );
    }

    #[test]
    fn test_content_disposition_keeps_non_ascii_name() {
        let value = content_disposition("vidéo_compressed.mp4");
        assert_eq!(
            value,
            "attachment; filename=\"vid_o_compressed.mp4\"; filename*=UTF-8''vid%C3%A9o_compressed.mp4"
        );
    }

    #[test]
    fn test_content_disposition_strips_quotes() {
        let value = content_disposition("a\"b.mp4");
        assert!(value.to_str().unwrap().starts_with("attachment; filename=\"a_b.mp4\";"));
    }
}
