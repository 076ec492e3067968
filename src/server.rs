//! HTTP surface: submit a clip, poll its progress, fetch the GIF.
//!
//!   GET  /                    front page
//!   POST /convert             start a conversion (JSON body)
//!   GET  /progress/:task_id   progress snapshot
//!   GET  /download/:gif_id    finished GIF as an attachment
//!   POST /cleanup/:gif_id     drop working files and progress
//!   GET  /health              liveness probe

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::GifcutError;
use crate::janitor;
use crate::progress::TaskState;
use crate::request::ClipRequest;
use crate::workflow::Workflow;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Application state shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
}

impl AppState {
    pub fn new(workflow: Workflow) -> Self {
        Self { workflow: Arc::new(workflow) }
    }
}

impl IntoResponse for GifcutError {
    fn into_response(self) -> Response {
        let status = match &self {
            GifcutError::Request(_) | GifcutError::UnsupportedSource(_) => StatusCode::BAD_REQUEST,
            GifcutError::TaskNotFound(_) | GifcutError::FileNotFound(_) => StatusCode::NOT_FOUND,
            GifcutError::Cancelled(_) => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/convert", post(convert))
        .route("/progress/:task_id", get(progress))
        .route("/download/:gif_id", get(download))
        .route("/cleanup/:gif_id", post(cleanup))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind, spawn the janitor, and serve until the process is stopped.
pub async fn start_server(workflow: Workflow) -> Result<()> {
    let config = workflow.config().server.clone();
    let state = AppState::new(workflow);

    let retention = Duration::from_secs(config.retention_minutes * 60);
    let every = Duration::from_secs(config.sweep_interval_secs.max(1));
    tokio::spawn(janitor::run(
        config.work_dir.clone(),
        state.workflow.progress().clone(),
        retention,
        every,
    ));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("gifcut listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn convert(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ClipRequest>, JsonRejection>,
) -> Response {
    let workflow = &state.workflow;
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected convert body: {}", rejection.body_text());
            return GifcutError::Request(rejection.body_text()).into_response();
        }
    };
    let spec = match request.normalize(&workflow.config().clip) {
        Ok(spec) => spec,
        Err(e) => {
            warn!("Rejected convert request: {}", e);
            return e.into_response();
        }
    };

    if request.wait {
        return match workflow.run_to_completion(&spec).await {
            Ok(gif_id) => Json(json!({
                "success": true,
                "gif_id": gif_id,
                "message": "GIF created successfully!",
            }))
            .into_response(),
            Err(e) => {
                error!("Conversion of {} failed: {}", spec.url, e);
                e.into_response()
            }
        };
    }

    let task_id = workflow.submit(spec).await;
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "task_id": task_id,
            "gif_id": task_id,
            "message": "Conversion started",
        })),
    )
        .into_response()
}

async fn progress(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    Json(state.workflow.progress().snapshot(&task_id).await).into_response()
}

/// Serve a finished GIF. A task that is still running has no complete file
/// yet, so it is refused without touching its progress entry.
async fn download(
    State(state): State<AppState>,
    Path(gif_id): Path<String>,
    request: Request,
) -> Response {
    let not_found = || (StatusCode::NOT_FOUND, "GIF not found").into_response();

    let path = match state.workflow.gif_path(&gif_id) {
        Ok(path) => path,
        Err(_) => return not_found(),
    };

    if let Some(entry) = state.workflow.progress().get(&gif_id).await {
        if entry.state == TaskState::Running {
            return (StatusCode::CONFLICT, "GIF not ready yet").into_response();
        }
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) if response.status().is_success() => {
            state.workflow.progress().remove(&gif_id).await;

            let mut response = response.into_response();
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"video.gif\""),
            );
            response
        }
        Ok(response) if response.status() == StatusCode::NOT_FOUND => not_found(),
        Ok(response) => response.into_response(),
        Err(err) => {
            error!("ServeFile error for {}: {}", path.display(), err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn cleanup(State(state): State<AppState>, Path(gif_id): Path<String>) -> Response {
    match state.workflow.cleanup(&gif_id).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => e.into_response(),
    }
}
