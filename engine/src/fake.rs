//! In-memory backend for tests and demos.
//!
//! Behaves like a toolkit with one pre-registered deployment. Tasks never
//! progress on their own; tests move them along with [`FakeRally::set_task_status`].
//! Logs and reports are real files in the workdir so the HTTP layer can serve
//! them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use rallyd_types::{
    CreateTaskRequest, DeploymentId, DeploymentRecord, RunVerificationRequest, TaskId,
    TaskRecord, TaskReportFormat, TaskStatus, VerificationId, VerificationRecord,
    VerificationReportFormat,
};
use rallyd_utils::redact_json_secrets;

use crate::backend::RallyBackend;
use crate::error::RallyError;
use crate::workdir::Workdir;

/// Lines written to every fake task log.
pub const FAKE_LOG_LINES: usize = 25;

#[derive(Debug, Default)]
struct FakeState {
    deployments: Vec<DeploymentRecord>,
    tempest: HashSet<DeploymentId>,
    tasks: Vec<TaskRecord>,
    started: Vec<CreateTaskRequest>,
    verifications: Vec<VerificationRecord>,
    db_recreations: usize,
}

#[derive(Debug)]
pub struct FakeRally {
    workdir: Workdir,
    state: RwLock<FakeState>,
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), RallyError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| RallyError::io(path, e))
}

impl FakeRally {
    pub const DEFAULT_DEPLOYMENT: &'static str = "5f1c2d3e-0000-4000-8000-000000000001";
    pub const DEFAULT_DEPLOYMENT_NAME: &'static str = "existing";

    #[must_use]
    pub fn new(workdir: Workdir) -> Self {
        let state = FakeState {
            deployments: vec![DeploymentRecord {
                uuid: DeploymentId::new(Self::DEFAULT_DEPLOYMENT),
                name: Some(Self::DEFAULT_DEPLOYMENT_NAME.to_string()),
                status: Some("deploy->finished".to_string()),
                created_at: Some(now()),
                active: Some("*".to_string()),
                config: Some(json!({
                    "type": "ExistingCloud",
                    "auth_url": "http://keystone.example:5000/v2.0",
                    "admin": {"username": "admin", "password": "fake-admin-password", "tenant_name": "admin"}
                })),
            }],
            ..FakeState::default()
        };
        Self {
            workdir,
            state: RwLock::new(state),
        }
    }

    #[must_use]
    pub fn workdir(&self) -> &Workdir {
        &self.workdir
    }

    /// Every task request the fake accepted, in order.
    pub async fn started_tasks(&self) -> Vec<CreateTaskRequest> {
        self.state.read().await.started.clone()
    }

    pub async fn set_task_status(&self, id: &TaskId, status: TaskStatus) {
        let mut state = self.state.write().await;
        if let Some(task) = state.tasks.iter_mut().find(|t| t.uuid == *id) {
            task.status = status;
        }
    }

    pub async fn set_verification_status(&self, id: &VerificationId, status: &str) {
        let mut state = self.state.write().await;
        if let Some(v) = state.verifications.iter_mut().find(|v| v.uuid == *id) {
            v.status = Some(status.to_string());
        }
    }

    pub async fn db_recreations(&self) -> usize {
        self.state.read().await.db_recreations
    }

    fn deployment<'a>(
        state: &'a FakeState,
        id: &DeploymentId,
    ) -> Result<&'a DeploymentRecord, RallyError> {
        state
            .deployments
            .iter()
            .find(|d| d.uuid == *id || d.name.as_deref() == Some(id.as_str()))
            .ok_or_else(|| RallyError::not_found("deployment", id.as_str()))
    }

    fn task<'a>(state: &'a FakeState, id: &TaskId) -> Result<&'a TaskRecord, RallyError> {
        state
            .tasks
            .iter()
            .find(|t| t.uuid == *id)
            .ok_or_else(|| RallyError::not_found("task", id.as_str()))
    }

    fn verification<'a>(
        state: &'a FakeState,
        id: &VerificationId,
    ) -> Result<&'a VerificationRecord, RallyError> {
        state
            .verifications
            .iter()
            .find(|v| v.uuid == *id)
            .ok_or_else(|| RallyError::not_found("verification", id.as_str()))
    }

    async fn write_report(&self, id: &TaskId, out: &Path, format: TaskReportFormat) -> Result<(), RallyError> {
        let body = match format {
            TaskReportFormat::Html => format!("<html><body>Report for task {id}</body></html>\n"),
            TaskReportFormat::Junit => {
                format!("<testsuite name=\"{id}\" tests=\"1\" failures=\"0\"/>\n")
            }
        };
        write(out, body).await
    }
}

#[async_trait]
impl RallyBackend for FakeRally {
    async fn recreate_db(&self) -> Result<(), RallyError> {
        let mut state = self.state.write().await;
        let recreations = state.db_recreations + 1;
        *state = FakeState {
            db_recreations: recreations,
            ..FakeState::default()
        };
        Ok(())
    }

    async fn create_deployment(
        &self,
        config: Value,
        name: &str,
    ) -> Result<DeploymentRecord, RallyError> {
        if name.trim().is_empty() {
            return Err(RallyError::invalid("deployment name must not be empty"));
        }
        let mut state = self.state.write().await;
        if state.deployments.iter().any(|d| d.name.as_deref() == Some(name)) {
            return Err(RallyError::invalid(format!("deployment '{name}' already exists")));
        }
        for d in &mut state.deployments {
            d.active = None;
        }
        let record = DeploymentRecord {
            uuid: DeploymentId::new(new_uuid()),
            name: Some(name.to_string()),
            status: Some("deploy->finished".to_string()),
            created_at: Some(now()),
            active: Some("*".to_string()),
            config: Some(config),
        };
        state.deployments.push(record.clone());
        Ok(DeploymentRecord {
            config: None,
            ..record
        })
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>, RallyError> {
        let state = self.state.read().await;
        Ok(state
            .deployments
            .iter()
            .map(|d| DeploymentRecord {
                config: None,
                ..d.clone()
            })
            .collect())
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, RallyError> {
        let state = self.state.read().await;
        let mut record = Self::deployment(&state, id)?.clone();
        if let Some(config) = record.config.as_mut() {
            redact_json_secrets(config);
        }
        Ok(record)
    }

    async fn recreate_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, RallyError> {
        {
            let mut state = self.state.write().await;
            let uuid = Self::deployment(&state, id)?.uuid.clone();
            if let Some(d) = state.deployments.iter_mut().find(|d| d.uuid == uuid) {
                d.created_at = Some(now());
            }
        }
        self.get_deployment(id).await
    }

    async fn destroy_deployment(&self, id: &DeploymentId) -> Result<(), RallyError> {
        let mut state = self.state.write().await;
        let uuid = Self::deployment(&state, id)?.uuid.clone();
        state.deployments.retain(|d| d.uuid != uuid);
        state.tempest.remove(&uuid);
        Ok(())
    }

    async fn tempest_installed(&self, id: &DeploymentId) -> Result<bool, RallyError> {
        Ok(self.state.read().await.tempest.contains(id))
    }

    async fn install_tempest(
        &self,
        id: &DeploymentId,
        source: Option<&str>,
    ) -> Result<(), RallyError> {
        let log = self.workdir.tempest_install_log(id)?;
        {
            let mut state = self.state.write().await;
            let uuid = Self::deployment(&state, id)?.uuid.clone();
            state.tempest.insert(uuid);
        }
        let source = source.unwrap_or("default source");
        write(&log, format!("Installing tempest from {source}\nTempest installed\n")).await
    }

    async fn reinstall_tempest(&self, id: &DeploymentId) -> Result<(), RallyError> {
        let mut state = self.state.write().await;
        let uuid = Self::deployment(&state, id)?.uuid.clone();
        state.tempest.insert(uuid);
        Ok(())
    }

    async fn uninstall_tempest(&self, id: &DeploymentId) -> Result<(), RallyError> {
        let mut state = self.state.write().await;
        let uuid = Self::deployment(&state, id)?.uuid.clone();
        state.tempest.remove(&uuid);
        Ok(())
    }

    async fn start_task(&self, request: &CreateTaskRequest) -> Result<TaskRecord, RallyError> {
        if !request.task_config.is_object() {
            return Err(RallyError::invalid("task_config must be a JSON object"));
        }
        let id = TaskId::new(new_uuid());
        let record = {
            let mut state = self.state.write().await;
            let deployment = match &request.deployment_uuid {
                Some(dep) => Self::deployment(&state, dep)?,
                None => state
                    .deployments
                    .iter()
                    .find(|d| d.active.is_some())
                    .ok_or_else(|| RallyError::invalid("no active deployment"))?,
            };
            let record = TaskRecord {
                uuid: id.clone(),
                deployment_name: deployment.name.clone(),
                tag: request.tag.clone(),
                status: TaskStatus::Running,
                created_at: Some(now()),
                duration: None,
            };
            state.tasks.push(record.clone());
            state.started.push(request.clone());
            record
        };

        let log: String = (0..FAKE_LOG_LINES)
            .map(|i| format!("Task {id}: line {i}\n"))
            .collect();
        write(&self.workdir.task_log(&id)?, log).await?;
        Ok(record)
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, RallyError> {
        Ok(self.state.read().await.tasks.clone())
    }

    async fn get_task(&self, id: &TaskId) -> Result<TaskRecord, RallyError> {
        let state = self.state.read().await;
        Self::task(&state, id).cloned()
    }

    async fn delete_task(&self, id: &TaskId, force: bool) -> Result<(), RallyError> {
        let mut state = self.state.write().await;
        let task = Self::task(&state, id)?;
        if !force && !task.status.is_terminal() {
            return Err(RallyError::invalid(format!(
                "task {id} is {}; use force to delete it",
                task.status
            )));
        }
        state.tasks.retain(|t| t.uuid != *id);
        Ok(())
    }

    async fn task_detailed(&self, id: &TaskId) -> Result<PathBuf, RallyError> {
        let status = self.get_task(id).await?.status;
        let path = self.workdir.task_detailed(id)?;
        write(
            &path,
            format!("Task {id}: {status}\n\ntest scenario Dummy.dummy\n"),
        )
        .await?;
        Ok(path)
    }

    async fn task_report(
        &self,
        id: &TaskId,
        format: TaskReportFormat,
    ) -> Result<PathBuf, RallyError> {
        self.get_task(id).await?;
        let path = self.workdir.task_report(id, format)?;
        self.write_report(id, &path, format).await?;
        Ok(path)
    }

    async fn task_report_to(&self, id: &TaskId, out: PathBuf) -> Result<PathBuf, RallyError> {
        self.get_task(id).await?;
        self.write_report(id, &out, TaskReportFormat::Html).await?;
        Ok(out)
    }

    fn task_log_path(&self, id: &TaskId) -> Result<PathBuf, RallyError> {
        self.workdir.task_log(id)
    }

    async fn start_verification(
        &self,
        request: &RunVerificationRequest,
    ) -> Result<VerificationRecord, RallyError> {
        let record = {
            let mut state = self.state.write().await;
            let uuid = Self::deployment(&state, &request.deployment_uuid)?.uuid.clone();
            if !state.tempest.contains(&uuid) {
                return Err(RallyError::TempestNotInstalled { deployment: uuid });
            }
            let record = VerificationRecord {
                uuid: VerificationId::new(new_uuid()),
                deployment_uuid: Some(uuid),
                set_name: Some(request.set_name.clone()),
                status: Some("running".to_string()),
                created_at: Some(now()),
                ..VerificationRecord::default()
            };
            state.verifications.push(record.clone());
            record
        };
        write(
            &self.workdir.tempest_log(&record.uuid)?,
            format!("Verification UUID: {}\n", record.uuid),
        )
        .await?;
        Ok(record)
    }

    async fn list_verifications(&self) -> Result<Vec<VerificationRecord>, RallyError> {
        Ok(self.state.read().await.verifications.clone())
    }

    async fn get_verification(
        &self,
        id: &VerificationId,
    ) -> Result<VerificationRecord, RallyError> {
        let state = self.state.read().await;
        Self::verification(&state, id).cloned()
    }

    async fn verification_results(&self, id: &VerificationId) -> Result<Value, RallyError> {
        let record = self.get_verification(id).await?;
        Ok(json!({
            "verification": record.uuid,
            "set_name": record.set_name,
            "tests": 1,
            "failures": 0,
            "test_cases": {
                "tempest.api.identity.test_smoke": {"status": "OK", "time": 0.42}
            }
        }))
    }

    async fn verification_report(
        &self,
        id: &VerificationId,
        format: VerificationReportFormat,
    ) -> Result<PathBuf, RallyError> {
        let results = self.verification_results(id).await?;
        let path = self.workdir.verification_report(id, format)?;
        let body = match format {
            VerificationReportFormat::Json => serde_json::to_string_pretty(&results)
                .map_err(|e| RallyError::internal(e.to_string()))?,
            VerificationReportFormat::Html => {
                format!("<html><body>Verification {id}</body></html>\n")
            }
        };
        write(&path, body).await?;
        Ok(path)
    }
}
