use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use rallyd_types::{
    CreateTaskRequest, DeploymentId, DeploymentRecord, RunVerificationRequest, TaskId,
    TaskRecord, TaskReportFormat, VerificationId, VerificationRecord, VerificationReportFormat,
};

use crate::error::RallyError;

/// Everything the HTTP layer needs from the benchmarking toolkit.
///
/// Paths returned by the report operations point at files inside the server
/// workdir, ready to be streamed back to the client.
#[async_trait]
pub trait RallyBackend: Send + Sync {
    async fn recreate_db(&self) -> Result<(), RallyError>;

    /// Register a deployment from a toolkit deployment config.
    async fn create_deployment(
        &self,
        config: Value,
        name: &str,
    ) -> Result<DeploymentRecord, RallyError>;
    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>, RallyError>;
    /// The record plus the deployment config, credentials masked.
    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, RallyError>;
    async fn recreate_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, RallyError>;
    async fn destroy_deployment(&self, id: &DeploymentId) -> Result<(), RallyError>;

    async fn tempest_installed(&self, id: &DeploymentId) -> Result<bool, RallyError>;
    /// Starts the install and returns immediately.
    async fn install_tempest(
        &self,
        id: &DeploymentId,
        source: Option<&str>,
    ) -> Result<(), RallyError>;
    async fn reinstall_tempest(&self, id: &DeploymentId) -> Result<(), RallyError>;
    async fn uninstall_tempest(&self, id: &DeploymentId) -> Result<(), RallyError>;

    /// Returns once the toolkit has assigned a task UUID. The task keeps
    /// running in the background.
    async fn start_task(&self, request: &CreateTaskRequest) -> Result<TaskRecord, RallyError>;
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, RallyError>;
    async fn get_task(&self, id: &TaskId) -> Result<TaskRecord, RallyError>;
    async fn delete_task(&self, id: &TaskId, force: bool) -> Result<(), RallyError>;
    async fn task_detailed(&self, id: &TaskId) -> Result<PathBuf, RallyError>;
    async fn task_report(
        &self,
        id: &TaskId,
        format: TaskReportFormat,
    ) -> Result<PathBuf, RallyError>;
    /// HTML report written to `out` instead of the default report name.
    async fn task_report_to(&self, id: &TaskId, out: PathBuf) -> Result<PathBuf, RallyError>;
    fn task_log_path(&self, id: &TaskId) -> Result<PathBuf, RallyError>;

    /// Fails with `TempestNotInstalled` when the deployment has no verifier.
    async fn start_verification(
        &self,
        request: &RunVerificationRequest,
    ) -> Result<VerificationRecord, RallyError>;
    async fn list_verifications(&self) -> Result<Vec<VerificationRecord>, RallyError>;
    async fn get_verification(&self, id: &VerificationId)
    -> Result<VerificationRecord, RallyError>;
    async fn verification_results(&self, id: &VerificationId) -> Result<Value, RallyError>;
    async fn verification_report(
        &self,
        id: &VerificationId,
        format: VerificationReportFormat,
    ) -> Result<PathBuf, RallyError>;
}
