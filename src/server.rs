//! HTTP surface of the dashboard.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Buf;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::{Filter, Rejection, Reply};

use crate::acquisition::Upload;
use crate::dashboard::{Dashboard, UploadOutcome};
use crate::errors::RoadSegError;
use crate::presentation::{render_page, SplitMapView};
use crate::storage::Storage;

pub type SharedDashboard = Arc<Mutex<Dashboard>>;

const MAX_UPLOAD_BYTES: u64 = 1 << 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub notice: Option<String>,
    pub view: SplitMapView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

/// Route tree. `storage` is the area the dashboard writes to; rasters are
/// served from it without taking the dashboard lock.
pub fn routes(
    dashboard: SharedDashboard,
    storage: Storage,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(with_dashboard(dashboard.clone()))
        .and_then(handle_index);

    let catalog = warp::path!("api" / "catalog")
        .and(warp::get())
        .and(with_dashboard(dashboard.clone()))
        .and_then(handle_catalog);

    let upload = warp::path!("api" / "upload")
        .and(warp::post())
        .and(warp::multipart::form().max_length(MAX_UPLOAD_BYTES))
        .and(with_dashboard(dashboard))
        .and_then(handle_upload);

    let rasters = warp::path!("rasters" / String / String)
        .and(warp::get())
        .and(warp::any().map(move || storage.clone()))
        .and_then(handle_raster);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "ok"})));

    index
        .or(catalog)
        .or(upload)
        .or(rasters)
        .or(health)
        .with(warp::trace::request())
}

pub async fn serve(dashboard: Dashboard, addr: SocketAddr) {
    let storage = dashboard.storage().clone();
    let routes = routes(Arc::new(Mutex::new(dashboard)), storage);
    tracing::info!(%addr, "dashboard listening");
    warp::serve(routes).run(addr).await;
}

fn with_dashboard(
    dashboard: SharedDashboard,
) -> impl Filter<Extract = (SharedDashboard,), Error = Infallible> + Clone {
    warp::any().map(move || dashboard.clone())
}

/// Runs `f` on the blocking pool while holding the dashboard lock, so at most
/// one pipeline pass is in flight.
async fn with_locked<T, F>(dashboard: SharedDashboard, f: F) -> Result<T, warp::reply::Response>
where
    T: Send + 'static,
    F: FnOnce(&mut Dashboard) -> crate::Result<T> + Send + 'static,
{
    let mut guard = dashboard.lock_owned().await;
    match tokio::task::spawn_blocking(move || f(&mut guard)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "dashboard request failed");
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, error_code(&err), &err.to_string()))
        }
        Err(join) => {
            tracing::error!(error = %join, "blocking task aborted");
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, "task_failed", &join.to_string()))
        }
    }
}

async fn handle_index(dashboard: SharedDashboard) -> Result<warp::reply::Response, Infallible> {
    let page = with_locked(dashboard, |d| Ok(render_page(&d.page_load()?)?)).await;
    Ok(match page {
        Ok(html) => warp::reply::html(html).into_response(),
        Err(resp) => resp,
    })
}

async fn handle_catalog(dashboard: SharedDashboard) -> Result<warp::reply::Response, Infallible> {
    Ok(match with_locked(dashboard, |d| d.view()).await {
        Ok(view) => warp::reply::json(&view).into_response(),
        Err(resp) => resp,
    })
}

async fn handle_upload(form: FormData, dashboard: SharedDashboard) -> Result<warp::reply::Response, Infallible> {
    let upload = match read_upload(form).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "missing_file",
                "multipart field `file` is required",
            ))
        }
        Err(err) => {
            return Ok(error_response(StatusCode::BAD_REQUEST, "invalid_multipart", &err.to_string()))
        }
    };

    let result = with_locked(dashboard, move |d| {
        let outcome = d.upload(upload)?;
        Ok((outcome, d.view()?))
    })
    .await;

    Ok(match result {
        Ok((outcome, view)) => {
            let (status, notice) = match outcome {
                UploadOutcome::Processed(_) => ("processed", None),
                UploadOutcome::Rejected { notice } => ("rejected", Some(notice)),
            };
            let resp = UploadResponse {
                status: status.to_string(),
                notice,
                view,
            };
            warp::reply::with_status(warp::reply::json(&resp), StatusCode::OK).into_response()
        }
        Err(resp) => resp,
    })
}

async fn read_upload(form: FormData) -> Result<Option<Upload>, warp::Error> {
    let parts: Vec<Part> = form.try_collect().await?;
    for part in parts {
        if part.name() != "file" {
            continue;
        }
        let file_name = part.filename().unwrap_or("upload").to_string();
        let content_type = part.content_type().unwrap_or_default().to_string();
        let bytes = part
            .stream()
            .try_fold(Vec::new(), |mut acc, mut chunk| async move {
                while chunk.has_remaining() {
                    let piece = chunk.chunk();
                    acc.extend_from_slice(piece);
                    let n = piece.len();
                    chunk.advance(n);
                }
                Ok::<_, warp::Error>(acc)
            })
            .await?;
        return Ok(Some(Upload {
            file_name,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

async fn handle_raster(area: String, file_name: String, storage: Storage) -> Result<warp::reply::Response, Infallible> {
    let Some(path) = storage.resolve(&area, &file_name) else {
        return Ok(error_response(StatusCode::NOT_FOUND, "not_found", "unknown raster"));
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(warp::reply::with_header(bytes, "content-type", "image/tiff").into_response()),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "raster not served");
            Ok(error_response(StatusCode::NOT_FOUND, "not_found", "unknown raster"))
        }
    }
}

fn error_code(err: &RoadSegError) -> &'static str {
    match err {
        RoadSegError::Configuration { .. } => "configuration",
        RoadSegError::FileSystem { .. } => "file_system",
        RoadSegError::Raster { .. } => "raster",
        RoadSegError::Model { .. } => "model",
        RoadSegError::Fetch { .. } => "fetch",
        RoadSegError::UnsupportedUpload { .. } => "unsupported_upload",
        RoadSegError::DimensionMismatch { .. } => "dimension_mismatch",
        RoadSegError::Validation { .. } => "validation",
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> warp::reply::Response {
    let body = ApiError {
        error: message.to_string(),
        code: code.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}
