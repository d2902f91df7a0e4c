use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use rallyd_types::{
    CreateDeploymentRequest, DeploymentId, DeploymentList, DeploymentRecord,
    InstallTempestRequest, Message, TempestStatus,
};

use super::ApiResult;
use crate::{ApiError, AppState};

fn default_deployment_name() -> String {
    format!("default-{}", uuid::Uuid::new_v4())
}

fn required<'a>(value: Option<&'a str>, field: &str) -> ApiResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("missing required field '{field}'")))
}

pub(crate) async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateDeploymentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DeploymentRecord>)> {
    let Json(request) = payload?;
    required(request.auth_url.as_deref(), "auth_url")?;
    required(request.username.as_deref(), "username")?;
    required(request.password.as_deref(), "password")?;
    required(request.tenant_name.as_deref(), "tenant_name")?;

    let name = request
        .environment_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map_or_else(default_deployment_name, ToString::to_string);

    let record = state
        .backend
        .create_deployment(request.existing_cloud_config(), &name)
        .await?;
    tracing::info!(deployment = %record.uuid, name = %name, "Deployment created");
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn list(State(state): State<AppState>) -> ApiResult<Json<DeploymentList>> {
    let deployments = state.backend.list_deployments().await?;
    Ok(Json(DeploymentList { deployments }))
}

pub(crate) async fn get(
    State(state): State<AppState>,
    Path(uuid): Path<DeploymentId>,
) -> ApiResult<Json<DeploymentRecord>> {
    Ok(Json(state.backend.get_deployment(&uuid).await?))
}

pub(crate) async fn recreate(
    State(state): State<AppState>,
    Path(uuid): Path<DeploymentId>,
) -> ApiResult<(StatusCode, Json<DeploymentRecord>)> {
    let record = state.backend.recreate_deployment(&uuid).await?;
    tracing::info!(deployment = %uuid, "Deployment recreated");
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn destroy(
    State(state): State<AppState>,
    Path(uuid): Path<DeploymentId>,
) -> ApiResult<StatusCode> {
    state.backend.destroy_deployment(&uuid).await?;
    tracing::info!(deployment = %uuid, "Deployment destroyed");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn install_tempest(
    State(state): State<AppState>,
    Path(uuid): Path<DeploymentId>,
    payload: Result<Option<Json<InstallTempestRequest>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let request = payload?.map(|Json(r)| r).unwrap_or_default();
    state
        .backend
        .install_tempest(&uuid, request.tempest_source.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Message::for_deployment("Start installing tempest", uuid)),
    ))
}

pub(crate) async fn tempest_status(
    State(state): State<AppState>,
    Path(uuid): Path<DeploymentId>,
) -> ApiResult<Json<TempestStatus>> {
    let installed = state.backend.tempest_installed(&uuid).await?;
    Ok(Json(TempestStatus { installed }))
}

pub(crate) async fn reinstall_tempest(
    State(state): State<AppState>,
    Path(uuid): Path<DeploymentId>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    state.backend.reinstall_tempest(&uuid).await?;
    tracing::info!(deployment = %uuid, "Tempest reinstalled");
    Ok((
        StatusCode::CREATED,
        Json(Message::for_deployment("Tempest reinstalled", uuid)),
    ))
}

pub(crate) async fn uninstall_tempest(
    State(state): State<AppState>,
    Path(uuid): Path<DeploymentId>,
) -> ApiResult<StatusCode> {
    state.backend.uninstall_tempest(&uuid).await?;
    tracing::info!(deployment = %uuid, "Tempest uninstalled");
    Ok(StatusCode::NO_CONTENT)
}
