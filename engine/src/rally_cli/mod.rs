//! Backend that drives the toolkit through its command-line tools.
//!
//! Short operations (listings, deletes, reports) run `rally` to completion
//! under `command_timeout`. Task runs, verifications and tempest installs are
//! spawned with output appended to a log file in the workdir and tracked by the
//! [`JobTracker`] until they exit.

mod parse;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::Instant;

use rallyd_config::RallydConfig;
use rallyd_types::{
    CreateTaskRequest, DeploymentId, DeploymentRecord, RunVerificationRequest, TaskId,
    TaskRecord, TaskReportFormat, TaskStatus, VerificationId, VerificationRecord,
    VerificationReportFormat,
};
use rallyd_utils::{
    PersistMode, SecretRedactor, atomic_write, atomic_write_with_mode, collect_json_secrets,
    redact_json_secrets,
};

use crate::backend::RallyBackend;
use crate::error::RallyError;
use crate::jobs::JobTracker;
use crate::process::{ChildGuard, run_captured, spawn_logged, tail};
use crate::workdir::{Workdir, validate_file_component};

pub use parse::find_uuid;

const UUID_POLL_INTERVAL: Duration = Duration::from_millis(100);
const LOG_TAIL_CHARS: usize = 2_000;

/// How to reach the toolkit. Built from [`RallydConfig`] in production.
#[derive(Debug, Clone)]
pub struct RallyCliSettings {
    pub binary: String,
    pub manage_binary: String,
    pub launcher: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub tempest_root: PathBuf,
    pub workdir: PathBuf,
    pub command_timeout: Duration,
    pub uuid_wait: Duration,
}

impl RallyCliSettings {
    #[must_use]
    pub fn from_config(config: &RallydConfig) -> Self {
        Self {
            binary: config.rally_binary(),
            manage_binary: config.manage_binary(),
            launcher: config.rally_launcher(),
            config_file: config.rally_config_file(),
            tempest_root: config.tempest_root(),
            workdir: config.workdir(),
            command_timeout: config.command_timeout(),
            uuid_wait: config.uuid_wait(),
        }
    }
}

pub struct RallyCli {
    settings: RallyCliSettings,
    workdir: Workdir,
    jobs: Arc<JobTracker>,
}

impl std::fmt::Debug for RallyCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RallyCli")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// A spawned long-running command whose UUID has been read from its log.
struct Launched {
    uuid: String,
    guard: ChildGuard,
    log: PathBuf,
}

impl RallyCli {
    #[must_use]
    pub fn new(settings: RallyCliSettings, jobs: Arc<JobTracker>) -> Self {
        let workdir = Workdir::new(settings.workdir.clone());
        Self {
            settings,
            workdir,
            jobs,
        }
    }

    #[must_use]
    pub fn workdir(&self) -> &Workdir {
        &self.workdir
    }

    /// Executables that cannot be found on `PATH`.
    #[must_use]
    pub fn missing_binaries(&self) -> Vec<String> {
        let wanted: Vec<String> = match &self.settings.launcher {
            Some(launcher) => vec![launcher.display().to_string()],
            None => vec![
                self.settings.binary.clone(),
                self.settings.manage_binary.clone(),
            ],
        };
        wanted
            .into_iter()
            .filter(|bin| which::which(bin).is_err())
            .collect()
    }

    fn command(&self, binary: &str, args: &[String]) -> Command {
        let mut cmd = match &self.settings.launcher {
            Some(launcher) => {
                let mut cmd = Command::new(launcher);
                cmd.arg(binary);
                cmd
            }
            None => Command::new(binary),
        };
        if let Some(config_file) = &self.settings.config_file {
            cmd.arg("--config-file").arg(config_file);
        }
        cmd.args(args).current_dir(self.workdir.root());
        cmd
    }

    /// `rally deployment list`, without option values that might carry secrets.
    fn label(binary: &str, args: &[String]) -> String {
        let name = Path::new(binary)
            .file_name()
            .map_or_else(|| binary.to_string(), |n| n.to_string_lossy().into_owned());
        let words: Vec<&str> = args
            .iter()
            .take_while(|a| !a.starts_with('-'))
            .take(2)
            .map(String::as_str)
            .collect();
        format!("{name} {}", words.join(" "))
    }

    async fn rally(&self, args: Vec<String>) -> Result<String, RallyError> {
        let label = Self::label(&self.settings.binary, &args);
        let cmd = self.command(&self.settings.binary, &args);
        run_captured(cmd, &label, self.settings.command_timeout)
            .await?
            .into_stdout()
    }

    /// Like [`Self::rally`], mapping "not found" complaints to `NotFound`.
    async fn rally_on(
        &self,
        kind: &'static str,
        id: &str,
        args: Vec<String>,
    ) -> Result<String, RallyError> {
        self.rally(args)
            .await
            .map_err(|e| parse::classify_not_found(e, kind, id))
    }

    async fn write_file(&self, path: PathBuf, bytes: Vec<u8>, mode: PersistMode) -> Result<(), RallyError> {
        let target = path.clone();
        tokio::task::spawn_blocking(move || atomic_write_with_mode(&target, &bytes, mode))
            .await
            .map_err(|e| RallyError::internal(format!("write task failed: {e}")))?
            .map_err(|e| RallyError::io(path, e))
    }

    /// Spawn a long-running command and wait for it to print its UUID.
    ///
    /// The output goes to a provisional log that is renamed with `final_log`
    /// once the UUID is known.
    async fn launch(
        &self,
        args: Vec<String>,
        keyword: &str,
        exclude: Option<&str>,
        final_log: impl Fn(&str) -> Result<PathBuf, RallyError>,
    ) -> Result<Launched, RallyError> {
        let label = Self::label(&self.settings.binary, &args);
        let pending = self.workdir.scratch(&format!("{keyword}_pending"), "log");
        let cmd = self.command(&self.settings.binary, &args);
        let mut guard = spawn_logged(cmd, &label, &pending)?;

        let waited = wait_for_uuid(
            &mut guard,
            &pending,
            keyword,
            exclude,
            self.settings.uuid_wait,
            &label,
        )
        .await;
        let uuid = match waited {
            Ok(uuid) => uuid,
            Err(e) => {
                drop(guard);
                let _ = tokio::fs::remove_file(&pending).await;
                return Err(e);
            }
        };

        let log = final_log(&uuid)?;
        // The child keeps its descriptor; the rename only changes the name.
        tokio::fs::rename(&pending, &log)
            .await
            .map_err(|e| RallyError::io(&log, e))?;
        tracing::info!(command = %label, uuid = %uuid, log = %log.display(), "Toolkit command started");

        Ok(Launched { uuid, guard, log })
    }

    /// Track the launched process until it exits, then remove `cleanup`.
    async fn track(&self, label: String, launched: Launched, cleanup: Option<PathBuf>) {
        let Launched { uuid, mut guard, log } = launched;
        self.jobs
            .spawn(label.clone(), async move {
                match guard.wait().await {
                    Ok(status) if status.success() => {
                        tracing::info!(job = %label, uuid = %uuid, "Toolkit command finished");
                    }
                    Ok(status) => {
                        tracing::warn!(
                            job = %label,
                            uuid = %uuid,
                            code = ?status.code(),
                            log = %log.display(),
                            "Toolkit command exited with failure"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(job = %label, uuid = %uuid, "Failed to wait for toolkit command: {e}");
                    }
                }
                if let Some(path) = cleanup {
                    let _ = tokio::fs::remove_file(path).await;
                }
            })
            .await;
    }

    fn tempest_marker(&self, id: &DeploymentId) -> Result<PathBuf, RallyError> {
        let id = validate_file_component(id.as_str())?;
        Ok(self
            .settings
            .tempest_root
            .join(format!("for-deployment-{id}"))
            .join(".testrepository"))
    }

    async fn find_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, RallyError> {
        self.list_deployments()
            .await?
            .into_iter()
            .find(|d| d.uuid == *id || d.name.as_deref() == Some(id.as_str()))
            .ok_or_else(|| RallyError::not_found("deployment", id.as_str()))
    }

    async fn report_into(&self, id: &TaskId, out: &Path, junit: bool) -> Result<(), RallyError> {
        let mut args = vec![
            "task".to_string(),
            "report".to_string(),
            "--tasks".to_string(),
            id.to_string(),
            "--out".to_string(),
            out.display().to_string(),
        ];
        if junit {
            args.push("--junit".to_string());
        }
        self.rally_on("task", id.as_str(), args).await?;
        ensure_written(out, "rally task report").await
    }
}

async fn ensure_written(path: &Path, command: &str) -> Result<(), RallyError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(RallyError::UnexpectedOutput {
            command: command.to_string(),
            message: format!("{} was not written", path.display()),
        }),
        Err(e) => Err(RallyError::io(path, e)),
    }
}

/// Poll `log` until a UUID shows up, the command exits, or `wait` elapses.
///
/// On timeout the caller drops the guard, which kills the command.
async fn wait_for_uuid(
    guard: &mut ChildGuard,
    log: &Path,
    keyword: &str,
    exclude: Option<&str>,
    wait: Duration,
    label: &str,
) -> Result<String, RallyError> {
    let deadline = Instant::now() + wait;
    loop {
        let exited = guard
            .child_mut()
            .try_wait()
            .map_err(|source| RallyError::Spawn {
                command: label.to_string(),
                source,
            })?;
        let bytes = tokio::fs::read(log).await.unwrap_or_default();
        let text = String::from_utf8_lossy(&bytes);
        if let Some(uuid) = find_uuid(&text, keyword, exclude) {
            return Ok(uuid);
        }

        if let Some(status) = exited {
            guard.disarm();
            let output = tail(&SecretRedactor::global().redact(text.trim()), LOG_TAIL_CHARS);
            if status.success() {
                return Err(RallyError::UnexpectedOutput {
                    command: label.to_string(),
                    message: format!("exited without reporting a {keyword} UUID: {output}"),
                });
            }
            return Err(RallyError::CommandFailed {
                command: label.to_string(),
                code: status.code(),
                stderr: output,
            });
        }

        if Instant::now() >= deadline {
            tracing::warn!(command = label, "No {keyword} UUID reported in time, killing command");
            return Err(RallyError::Timeout {
                command: label.to_string(),
                elapsed: wait,
            });
        }
        tokio::time::sleep(UUID_POLL_INTERVAL).await;
    }
}

fn redact_failure(err: RallyError, redactor: &SecretRedactor) -> RallyError {
    match err {
        RallyError::CommandFailed {
            command,
            code,
            stderr,
        } => RallyError::CommandFailed {
            command,
            code,
            stderr: redactor.redact(&stderr).into_owned(),
        },
        other => other,
    }
}

fn argv<const N: usize>(words: [&str; N]) -> Vec<String> {
    words.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl RallyBackend for RallyCli {
    async fn recreate_db(&self) -> Result<(), RallyError> {
        let args = argv(["db", "recreate"]);
        let label = Self::label(&self.settings.manage_binary, &args);
        let cmd = self.command(&self.settings.manage_binary, &args);
        run_captured(cmd, &label, self.settings.command_timeout)
            .await?
            .into_stdout()?;
        tracing::info!("Toolkit database recreated");
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
        let redactor = SecretRedactor::global().with_secrets(collect_json_secrets(&config));
        let bytes = serde_json::to_vec_pretty(&config)
            .map_err(|e| RallyError::invalid(format!("deployment config: {e}")))?;
        let file = self.workdir.scratch("deployment", "json");
        self.write_file(file.clone(), bytes, PersistMode::SensitiveOwnerOnly)
            .await?;

        let created = self
            .rally(vec![
                "deployment".to_string(),
                "create".to_string(),
                "--filename".to_string(),
                file.display().to_string(),
                "--name".to_string(),
                name.to_string(),
            ])
            .await;
        if let Err(e) = tokio::fs::remove_file(&file).await {
            tracing::warn!(path = %file.display(), "Failed to remove deployment config: {e}");
        }
        created.map_err(|e| redact_failure(e, &redactor))?;

        let record = self
            .list_deployments()
            .await?
            .into_iter()
            .find(|d| d.name.as_deref() == Some(name))
            .ok_or_else(|| RallyError::UnexpectedOutput {
                command: "rally deployment create".to_string(),
                message: format!("deployment '{name}' missing from listing"),
            })?;
        tracing::info!(uuid = %record.uuid, name, "Deployment created");
        Ok(record)
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>, RallyError> {
        let stdout = self.rally(argv(["deployment", "list"])).await?;
        Ok(parse::deployments(&stdout))
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, RallyError> {
        let mut record = self.find_deployment(id).await?;
        let stdout = self
            .rally_on(
                "deployment",
                id.as_str(),
                vec![
                    "deployment".to_string(),
                    "config".to_string(),
                    "--deployment".to_string(),
                    record.uuid.to_string(),
                ],
            )
            .await?;
        let mut config = parse::json_document("rally deployment config", &stdout)?;
        redact_json_secrets(&mut config);
        record.config = Some(config);
        Ok(record)
    }

    async fn recreate_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, RallyError> {
        let existing = self.find_deployment(id).await?;
        self.rally_on(
            "deployment",
            id.as_str(),
            vec![
                "deployment".to_string(),
                "recreate".to_string(),
                "--deployment".to_string(),
                existing.uuid.to_string(),
            ],
        )
        .await?;
        tracing::info!(uuid = %existing.uuid, "Deployment recreated");
        self.get_deployment(&existing.uuid).await
    }

    async fn destroy_deployment(&self, id: &DeploymentId) -> Result<(), RallyError> {
        let existing = self.find_deployment(id).await?;
        self.rally_on(
            "deployment",
            id.as_str(),
            vec![
                "deployment".to_string(),
                "destroy".to_string(),
                "--deployment".to_string(),
                existing.uuid.to_string(),
            ],
        )
        .await?;
        tracing::info!(uuid = %existing.uuid, "Deployment destroyed");
        Ok(())
    }

    async fn tempest_installed(&self, id: &DeploymentId) -> Result<bool, RallyError> {
        let marker = self.tempest_marker(id)?;
        tokio::fs::try_exists(&marker)
            .await
            .map_err(|e| RallyError::io(marker, e))
    }

    async fn install_tempest(
        &self,
        id: &DeploymentId,
        source: Option<&str>,
    ) -> Result<(), RallyError> {
        let log = self.workdir.tempest_install_log(id)?;
        let mut args = vec![
            "verify".to_string(),
            "install".to_string(),
            "--deployment".to_string(),
            id.to_string(),
        ];
        if let Some(source) = source.filter(|s| !s.trim().is_empty()) {
            args.push("--source".to_string());
            args.push(source.to_string());
        }
        let label = Self::label(&self.settings.binary, &args);
        let cmd = self.command(&self.settings.binary, &args);
        let mut guard = spawn_logged(cmd, &label, &log)?;
        tracing::info!(deployment = %id, log = %log.display(), "Installing tempest");

        let deployment = id.clone();
        self.jobs
            .spawn(format!("tempest install {id}"), async move {
                match guard.wait().await {
                    Ok(status) if status.success() => {
                        tracing::info!(deployment = %deployment, "Tempest installed");
                    }
                    Ok(status) => tracing::warn!(
                        deployment = %deployment,
                        code = ?status.code(),
                        log = %log.display(),
                        "Tempest install failed"
                    ),
                    Err(e) => tracing::warn!(deployment = %deployment, "Tempest install wait failed: {e}"),
                }
            })
            .await;
        Ok(())
    }

    async fn reinstall_tempest(&self, id: &DeploymentId) -> Result<(), RallyError> {
        self.rally_on(
            "deployment",
            id.as_str(),
            vec![
                "verify".to_string(),
                "reinstall".to_string(),
                "--deployment".to_string(),
                id.to_string(),
            ],
        )
        .await?;
        tracing::info!(deployment = %id, "Tempest reinstalled");
        Ok(())
    }

    async fn uninstall_tempest(&self, id: &DeploymentId) -> Result<(), RallyError> {
        self.rally_on(
            "deployment",
            id.as_str(),
            vec![
                "verify".to_string(),
                "uninstall".to_string(),
                "--deployment".to_string(),
                id.to_string(),
            ],
        )
        .await?;
        tracing::info!(deployment = %id, "Tempest uninstalled");
        Ok(())
    }

    async fn start_task(&self, request: &CreateTaskRequest) -> Result<TaskRecord, RallyError> {
        if !request.task_config.is_object() {
            return Err(RallyError::invalid("task_config must be a JSON object"));
        }
        let config_file = self.workdir.scratch("task_config", "json");
        let bytes = serde_json::to_vec_pretty(&request.task_config)
            .map_err(|e| RallyError::invalid(format!("task_config: {e}")))?;
        self.write_file(config_file.clone(), bytes, PersistMode::Default)
            .await?;

        let mut args = vec!["task".to_string(), "start".to_string()];
        if let Some(deployment) = &request.deployment_uuid {
            args.push("--deployment".to_string());
            args.push(deployment.to_string());
        }
        args.push("--task".to_string());
        args.push(config_file.display().to_string());
        if !request.task_params.is_empty() {
            args.push("--task-args".to_string());
            args.push(Value::Object(request.task_params.clone()).to_string());
        }
        if let Some(tag) = request.tag.as_ref().filter(|t| !t.trim().is_empty()) {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        if request.abort_on_sla_failure {
            args.push("--abort-on-sla-failure".to_string());
        }

        let exclude = request.deployment_uuid.as_ref().map(DeploymentId::as_str);
        let launched = match self
            .launch(args, "task", exclude, |uuid| {
                self.workdir.task_log(&TaskId::new(uuid))
            })
            .await
        {
            Ok(launched) => launched,
            Err(e) => {
                let _ = tokio::fs::remove_file(&config_file).await;
                return Err(e);
            }
        };

        let id = TaskId::new(launched.uuid.clone());
        self.track(format!("task {id}"), launched, Some(config_file))
            .await;

        match self.get_task(&id).await {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::debug!(task = %id, "Task not listed yet: {e}");
                let mut record = TaskRecord::new(id, TaskStatus::Init);
                record.tag.clone_from(&request.tag);
                Ok(record)
            }
        }
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, RallyError> {
        let stdout = self.rally(argv(["task", "list", "--all-deployments"])).await?;
        Ok(parse::tasks(&stdout))
    }

    async fn get_task(&self, id: &TaskId) -> Result<TaskRecord, RallyError> {
        self.list_tasks()
            .await?
            .into_iter()
            .find(|t| t.uuid == *id)
            .ok_or_else(|| RallyError::not_found("task", id.as_str()))
    }

    async fn delete_task(&self, id: &TaskId, force: bool) -> Result<(), RallyError> {
        self.get_task(id).await?;
        let mut args = vec![
            "task".to_string(),
            "delete".to_string(),
            "--uuid".to_string(),
            id.to_string(),
        ];
        if force {
            args.push("--force".to_string());
        }
        self.rally_on("task", id.as_str(), args).await?;
        tracing::info!(task = %id, force, "Task deleted");
        Ok(())
    }

    async fn task_detailed(&self, id: &TaskId) -> Result<PathBuf, RallyError> {
        let path = self.workdir.task_detailed(id)?;
        let stdout = self
            .rally_on(
                "task",
                id.as_str(),
                vec!["task".to_string(), "detailed".to_string(), id.to_string()],
            )
            .await?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&target, stdout.as_bytes()))
            .await
            .map_err(|e| RallyError::internal(format!("write task failed: {e}")))?
            .map_err(|e| RallyError::io(&path, e))?;
        Ok(path)
    }

    async fn task_report(
        &self,
        id: &TaskId,
        format: TaskReportFormat,
    ) -> Result<PathBuf, RallyError> {
        let path = self.workdir.task_report(id, format)?;
        self.report_into(id, &path, format == TaskReportFormat::Junit)
            .await?;
        Ok(path)
    }

    async fn task_report_to(&self, id: &TaskId, out: PathBuf) -> Result<PathBuf, RallyError> {
        self.report_into(id, &out, false).await?;
        Ok(out)
    }

    fn task_log_path(&self, id: &TaskId) -> Result<PathBuf, RallyError> {
        self.workdir.task_log(id)
    }

    async fn start_verification(
        &self,
        request: &RunVerificationRequest,
    ) -> Result<VerificationRecord, RallyError> {
        let deployment = &request.deployment_uuid;
        if !self.tempest_installed(deployment).await? {
            return Err(RallyError::TempestNotInstalled {
                deployment: deployment.clone(),
            });
        }

        let mut args = vec![
            "verify".to_string(),
            "start".to_string(),
            "--deployment".to_string(),
            deployment.to_string(),
            "--set".to_string(),
            request.set_name.clone(),
        ];
        if let Some(regex) = request.regex.as_ref().filter(|r| !r.is_empty()) {
            args.push("--regex".to_string());
            args.push(regex.clone());
        }
        if let Some(config) = request.tempest_config.as_ref().filter(|c| !c.is_empty()) {
            args.push("--tempest-config".to_string());
            args.push(config.clone());
        }

        let launched = self
            .launch(args, "verification", Some(deployment.as_str()), |uuid| {
                self.workdir.tempest_log(&VerificationId::new(uuid))
            })
            .await?;
        let id = VerificationId::new(launched.uuid.clone());
        self.track(format!("verification {id}"), launched, None)
            .await;

        match self.get_verification(&id).await {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::debug!(verification = %id, "Verification not listed yet: {e}");
                Ok(VerificationRecord {
                    uuid: id,
                    deployment_uuid: Some(deployment.clone()),
                    set_name: Some(request.set_name.clone()),
                    status: Some("running".to_string()),
                    ..VerificationRecord::default()
                })
            }
        }
    }

    async fn list_verifications(&self) -> Result<Vec<VerificationRecord>, RallyError> {
        let stdout = self.rally(argv(["verify", "list"])).await?;
        Ok(parse::verifications(&stdout))
    }

    async fn get_verification(
        &self,
        id: &VerificationId,
    ) -> Result<VerificationRecord, RallyError> {
        self.list_verifications()
            .await?
            .into_iter()
            .find(|v| v.uuid == *id)
            .ok_or_else(|| RallyError::not_found("verification", id.as_str()))
    }

    async fn verification_results(&self, id: &VerificationId) -> Result<Value, RallyError> {
        self.get_verification(id).await?;
        let stdout = self
            .rally_on(
                "verification",
                id.as_str(),
                vec![
                    "verify".to_string(),
                    "results".to_string(),
                    "--uuid".to_string(),
                    id.to_string(),
                    "--json".to_string(),
                ],
            )
            .await?;
        parse::json_document("rally verify results", &stdout)
    }

    async fn verification_report(
        &self,
        id: &VerificationId,
        format: VerificationReportFormat,
    ) -> Result<PathBuf, RallyError> {
        self.get_verification(id).await?;
        let path = self.workdir.verification_report(id, format)?;
        self.rally_on(
            "verification",
            id.as_str(),
            vec![
                "verify".to_string(),
                "results".to_string(),
                "--uuid".to_string(),
                id.to_string(),
                format!("--{}", format.as_str()),
                "--output-file".to_string(),
                path.display().to_string(),
            ],
        )
        .await?;
        ensure_written(&path, "rally verify results").await?;
        Ok(path)
    }
}
