// src/server/routes.rs

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::errors::ProofrunError;
use crate::orchestrator::{Orchestrator, TaskStatus};
use crate::runs::{RunInfo, VerificationResult};
use crate::server::error::ApiError;
use crate::types::ArchiveFormat;

type ApiResult<T> = Result<T, ApiError>;

/// Routes of the task API, relative to the configured prefix.
pub fn api_routes() -> Router<Orchestrator> {
    Router::new()
        .route("/tasks", get(list_runs).post(start_run))
        .route("/tasks/current", delete(cancel_run))
        .route("/tasks/current/status", get(task_status))
        .route("/tasks/current/output", get(output_ws))
        .route("/tasks/current/result/{proof}", get(proof_result))
        .route("/tasks/{run_id}", delete(delete_run))
        .route("/tasks/{run_id}/download", get(download_run))
        .route("/tasks/{run_id}/files", get(run_index))
        .route("/tasks/{run_id}/files/{*path}", get(run_file))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_runs(State(orch): State<Orchestrator>) -> ApiResult<Json<Vec<RunInfo>>> {
    Ok(Json(orch.list()?))
}

async fn start_run(State(orch): State<Orchestrator>) -> ApiResult<(StatusCode, Json<RunInfo>)> {
    let run = orch.start().await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

async fn cancel_run(State(orch): State<Orchestrator>) -> ApiResult<StatusCode> {
    orch.cancel().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn task_status(State(orch): State<Orchestrator>) -> Json<TaskStatus> {
    Json(orch.status())
}

async fn proof_result(
    State(orch): State<Orchestrator>,
    Path(proof): Path<String>,
) -> ApiResult<Json<VerificationResult>> {
    Ok(Json(orch.result(&proof)?))
}

async fn delete_run(
    State(orch): State<Orchestrator>,
    Path(run_id): Path<String>,
) -> ApiResult<StatusCode> {
    orch.delete(&run_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    format: Option<String>,
}

async fn download_run(
    State(orch): State<Orchestrator>,
    Path(run_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let format = match query.format.as_deref() {
        Some(raw) => raw
            .parse::<ArchiveFormat>()
            .map_err(ProofrunError::InvalidArgument)?,
        None => ArchiveFormat::default(),
    };

    let archive = orch.archive(&run_id, format).await?;
    let file = tokio::fs::File::open(&archive.path)
        .await
        .map_err(ProofrunError::from)?;
    let disposition = format!("attachment; filename=\"{}\"", archive.file_name());

    // The stream owns the archive; the temp file goes away when the body is
    // dropped, whether it was sent completely or the client went away.
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _held = &archive;
        chunk
    });

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

async fn run_index(
    State(orch): State<Orchestrator>,
    Path(run_id): Path<String>,
) -> ApiResult<Response> {
    serve_artifact(&orch, &run_id, "").await
}

async fn run_file(
    State(orch): State<Orchestrator>,
    Path((run_id, path)): Path<(String, String)>,
) -> ApiResult<Response> {
    serve_artifact(&orch, &run_id, &path).await
}

async fn serve_artifact(orch: &Orchestrator, run_id: &str, relative: &str) -> ApiResult<Response> {
    let path = orch.artifact_path(run_id, relative)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(ProofrunError::from)?;

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&path)),
    );
    Ok(response)
}

fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("xml") => "application/xml",
        Some("txt" | "log" | "c" | "h") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn output_ws(ws: WebSocketUpgrade, State(orch): State<Orchestrator>) -> Response {
    ws.on_upgrade(move |socket| stream_output(socket, orch))
}

/// Send one text message per output line, then close.
async fn stream_output(mut socket: WebSocket, orch: Orchestrator) {
    let mut sub = orch.subscribe_output().await;
    let mut sent = 0usize;
    info!("output subscriber connected");

    loop {
        tokio::select! {
            line = sub.next_line() => {
                let Some(line) = line else { break };
                if socket.send(Message::Text(format!("{line}\n").into())).await.is_err() {
                    debug!(lines = sent, "output subscriber went away");
                    return;
                }
                sent += 1;
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(lines = sent, "output subscriber disconnected");
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    info!(lines = sent, "output stream finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_pages_get_html_content_type() {
        assert_eq!(
            content_type_for(FsPath::new("html/index.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            content_type_for(FsPath::new("a/viewer-result.JSON")),
            "application/json"
        );
        assert_eq!(
            content_type_for(FsPath::new("bin/blob")),
            "application/octet-stream"
        );
    }
}
