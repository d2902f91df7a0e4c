use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use rallyd_types::{Run, RunId, RunList, RunResults, StartRunRequest};

use super::ApiResult;
use crate::AppState;

pub(crate) async fn start(
    State(state): State<AppState>,
    payload: Result<Json<StartRunRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    let Json(request) = payload?;
    let run = state.runs.start(request).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

pub(crate) async fn list(State(state): State<AppState>) -> ApiResult<Json<RunList>> {
    let runs = state.runs.list().await?;
    Ok(Json(RunList { runs }))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(id): Path<RunId>,
) -> ApiResult<Json<Run>> {
    Ok(Json(state.runs.get(&id).await?))
}

pub(crate) async fn results(
    State(state): State<AppState>,
    Path(id): Path<RunId>,
) -> ApiResult<Json<RunResults>> {
    let results = state.runs.results(&id).await?;
    Ok(Json(RunResults { results }))
}
