use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use rallyd_engine::{RallyError, read_lines};
use rallyd_types::{
    CreateTaskRequest, DEFAULT_LOG_START_LINE, LogSlice, TaskId, TaskList, TaskRecord,
    TaskReportFormat,
};

use super::files::{TEXT_PLAIN, content_type_for, file_response};
use super::{ApiResult, flag};
use crate::AppState;

pub(crate) async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TaskRecord>)> {
    let Json(request) = payload?;
    let record = state.backend.start_task(&request).await?;
    tracing::info!(task = %record.uuid, tag = ?record.tag, "Task started");
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn list(State(state): State<AppState>) -> ApiResult<Json<TaskList>> {
    let tasks = state.backend.list_tasks().await?;
    Ok(Json(TaskList { tasks }))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(uuid): Path<TaskId>,
) -> ApiResult<Json<TaskRecord>> {
    Ok(Json(state.backend.get_task(&uuid).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteQuery {
    force: Option<String>,
}

pub(crate) async fn delete(
    State(state): State<AppState>,
    Path(uuid): Path<TaskId>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let Query(query) = query?;
    let force = flag(query.force.as_deref());
    state.backend.delete_task(&uuid, force).await?;
    tracing::info!(task = %uuid, force, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogQuery {
    start_line: Option<i64>,
    end_line: Option<i64>,
}

/// Slice of the task log. Without `start_line` the client is redirected to
/// the tail of the log.
pub(crate) async fn log(
    State(state): State<AppState>,
    Path(uuid): Path<TaskId>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let path = state.backend.task_log_path(&uuid)?;

    let Some(start) = query.start_line else {
        let target = match query.end_line {
            Some(end) => {
                format!("/tasks/{uuid}/log?start_line={DEFAULT_LOG_START_LINE}&end_line={end}")
            }
            None => format!("/tasks/{uuid}/log?start_line={DEFAULT_LOG_START_LINE}"),
        };
        return Ok(Redirect::to(&target).into_response());
    };

    let lines = read_lines(&path).await.map_err(|e| {
        if e.is_not_found() {
            RallyError::not_found("task log", uuid.as_str())
        } else {
            e
        }
    })?;
    Ok(Json(LogSlice::from_lines(uuid, &lines, start, query.end_line)).into_response())
}

pub(crate) async fn result(
    State(state): State<AppState>,
    Path(uuid): Path<TaskId>,
) -> ApiResult<Response> {
    let path = state.backend.task_detailed(&uuid).await?;
    file_response(&path, TEXT_PLAIN).await
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportQuery {
    format: Option<String>,
}

pub(crate) async fn report(
    State(state): State<AppState>,
    Path(uuid): Path<TaskId>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let format = query
        .format
        .as_deref()
        .map(str::parse::<TaskReportFormat>)
        .transpose()
        .map_err(RallyError::from)?
        .unwrap_or_default();
    let path = state.backend.task_report(&uuid, format).await?;
    file_response(&path, content_type_for(&path)).await
}
