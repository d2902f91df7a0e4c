use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use rallyd_engine::RallyError;
use rallyd_types::{
    RunVerificationRequest, VerificationId, VerificationList, VerificationRecord,
    VerificationReportFormat,
};

use super::files::{OCTET_STREAM, file_response};
use super::{ApiResult, flag};
use crate::AppState;

pub(crate) async fn start(
    State(state): State<AppState>,
    payload: Result<Json<RunVerificationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<VerificationRecord>)> {
    let Json(request) = payload?;
    let record = state.backend.start_verification(&request).await?;
    tracing::info!(
        verification = %record.uuid,
        deployment = %request.deployment_uuid,
        set = %request.set_name,
        "Verification started"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn list(State(state): State<AppState>) -> ApiResult<Json<VerificationList>> {
    let verifications = state.backend.list_verifications().await?;
    Ok(Json(VerificationList { verifications }))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(uuid): Path<VerificationId>,
) -> ApiResult<Json<VerificationRecord>> {
    Ok(Json(state.backend.get_verification(&uuid).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultsQuery {
    detailed: Option<String>,
}

/// The verification summary, or the toolkit's full results with `?detailed`.
pub(crate) async fn results(
    State(state): State<AppState>,
    Path(uuid): Path<VerificationId>,
    query: Result<Query<ResultsQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    if flag(query.detailed.as_deref()) {
        let results = state.backend.verification_results(&uuid).await?;
        return Ok(Json(results).into_response());
    }
    let record = state.backend.get_verification(&uuid).await?;
    Ok(Json(record).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportQuery {
    report_format: Option<String>,
}

pub(crate) async fn report(
    State(state): State<AppState>,
    Path(uuid): Path<VerificationId>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let format = query
        .report_format
        .as_deref()
        .map(str::parse::<VerificationReportFormat>)
        .transpose()
        .map_err(RallyError::from)?
        .unwrap_or_default();
    let path = state.backend.verification_report(&uuid, format).await?;
    file_response(&path, OCTET_STREAM).await
}
