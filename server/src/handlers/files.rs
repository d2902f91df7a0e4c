//! Serving files generated into the workdir.

use std::path::Path;

use axum::extract::{Path as UrlPath, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use rallyd_engine::RallyError;

use super::ApiResult;
use crate::AppState;

pub(crate) const OCTET_STREAM: &str = "application/octet-stream";
pub(crate) const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub(crate) fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("log" | "txt") => TEXT_PLAIN,
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        _ => OCTET_STREAM,
    }
}

/// Send a workdir file as an attachment.
pub(crate) async fn file_response(path: &Path, content_type: &'static str) -> ApiResult<Response> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RallyError::not_found("file", name.clone())
        } else {
            RallyError::io(path, e)
        }
    })?;
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

pub(crate) async fn result_file(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<Response> {
    let path = state.workdir.result_file(&filename)?;
    file_response(&path, content_type_for(&path)).await
}
