use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use serde::Serialize;
use serde_json::{Map, Value};

use rallyd_client::RallydClient;
use rallyd_types::{
    CreateDeploymentRequest, CreateTaskRequest, DEFAULT_VERIFICATION_SET, DeploymentId, RunId,
    RunVerificationRequest, StartRunRequest, TaskId, TaskReportFormat, VerificationId,
    VerificationReportFormat,
};

use crate::output::{Collection, Output};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Recreate the rally database.
    RecreateDb,
    /// Register an existing cloud as a deployment.
    DeploymentCreate {
        #[arg(long, env = "OS_AUTH_URL")]
        auth_url: Option<String>,
        #[arg(long, env = "OS_USERNAME")]
        username: Option<String>,
        #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long, env = "OS_TENANT_NAME")]
        tenant_name: Option<String>,
        /// Deployment name (default: default-<uuid>).
        #[arg(long)]
        name: Option<String>,
    },
    /// List deployments.
    DeploymentList,
    /// Show one deployment with its (masked) config.
    DeploymentGet { deployment_uuid: String },
    DeploymentRecreate { deployment_uuid: String },
    DeploymentDelete { deployment_uuid: String },
    /// Start a rally task from a JSON task file.
    TaskCreate {
        deployment_uuid: String,
        task_filename: PathBuf,
        /// key=value argument for rendering the task; repeatable.
        #[arg(long = "task-params", value_parser = parse_task_param)]
        task_params: Vec<(String, Value)>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        abort_on_sla_failure: bool,
    },
    TaskList,
    TaskGet { task_uuid: String },
    /// Print lines of a task log (default: the last ten).
    TaskLog {
        task_uuid: String,
        #[arg(long, allow_hyphen_values = true)]
        start_line: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        end_line: Option<i64>,
    },
    /// Download the detailed task result.
    TaskResult {
        task_uuid: String,
        #[arg(long, default_value = ".")]
        download_dir: PathBuf,
    },
    /// Download a task report.
    TaskReport {
        task_uuid: String,
        #[arg(long, default_value = "html", value_parser = parse_task_format)]
        report_format: TaskReportFormat,
        #[arg(long, default_value = ".")]
        download_dir: PathBuf,
    },
    TaskDelete {
        task_uuid: String,
        /// Delete even if the task is still running.
        #[arg(long)]
        force: bool,
    },
    /// Start several tasks as one run.
    RunStart {
        deployment_uuid: String,
        /// One task file per task of the run.
        #[arg(required = true)]
        task_filenames: Vec<PathBuf>,
        /// Tag applied to every task of the run.
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        abort_on_sla_failure: bool,
    },
    RunList,
    RunGet { run_id: String },
    /// List (or download) the per-task reports of a run.
    RunResult {
        run_id: String,
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },
    TempestInstall {
        deployment_uuid: String,
        #[arg(long)]
        tempest_source: Option<String>,
    },
    TempestCheck { deployment_uuid: String },
    TempestReinstall { deployment_uuid: String },
    TempestUninstall { deployment_uuid: String },
    /// Run tempest against a deployment.
    VerificationStart {
        deployment_uuid: String,
        /// full, smoke, scenario or api.
        #[arg(long, default_value = DEFAULT_VERIFICATION_SET)]
        set_name: String,
        #[arg(long)]
        regex: Option<String>,
        /// Path to a custom tempest config on the server.
        #[arg(long)]
        tempest_config: Option<String>,
    },
    VerificationList,
    VerificationGet {
        verification_uuid: String,
    },
    VerificationResult {
        verification_uuid: String,
        /// Print the raw results instead of the summary.
        #[arg(long)]
        detailed: bool,
    },
    /// Download a verification report.
    VerificationReport {
        verification_uuid: String,
        #[arg(long, default_value = "html", value_parser = parse_verification_format)]
        report_format: VerificationReportFormat,
        #[arg(long, default_value = ".")]
        download_dir: PathBuf,
    },
}

fn parse_task_format(raw: &str) -> Result<TaskReportFormat, String> {
    raw.parse().map_err(|e: rallyd_types::ReportFormatError| e.to_string())
}

fn parse_verification_format(raw: &str) -> Result<VerificationReportFormat, String> {
    raw.parse().map_err(|e: rallyd_types::ReportFormatError| e.to_string())
}

/// `key=value`; the value is JSON when it parses as JSON, a string otherwise.
fn parse_task_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

async fn read_task_file(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read task file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Task file {} is not valid JSON", path.display()))
}

fn resource<T: Serialize>(value: &T) -> Result<Output> {
    Ok(Output::Resource(serde_json::to_value(value)?))
}

fn collection<T: Serialize>(kind: Collection, value: &T) -> Result<Output> {
    Ok(Output::Collection(kind, serde_json::to_value(value)?))
}

fn message<T: Serialize>(value: &T) -> Result<Output> {
    Ok(Output::Message(serde_json::to_value(value)?))
}

fn deleted() -> Output {
    Output::Nothing {
        msg: "Deleted".to_string(),
    }
}

fn require(value: Option<String>, flag: &str, env: &str) -> Result<String> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => Ok(v),
        None => bail!("missing --{flag} (or set {env})"),
    }
}

impl Command {
    pub async fn execute(self, client: &RallydClient) -> Result<Output> {
        match self {
            Self::RecreateDb => message(&client.recreate_db().await?),

            Self::DeploymentCreate {
                auth_url,
                username,
                password,
                tenant_name,
                name,
            } => {
                let request = CreateDeploymentRequest {
                    auth_url: Some(require(auth_url, "auth-url", "OS_AUTH_URL")?),
                    username: Some(require(username, "username", "OS_USERNAME")?),
                    password: Some(require(password, "password", "OS_PASSWORD")?),
                    tenant_name: Some(require(tenant_name, "tenant-name", "OS_TENANT_NAME")?),
                    environment_name: name,
                };
                resource(&client.create_deployment(&request).await?)
            }
            Self::DeploymentList => collection(
                Collection::Deployments,
                &client.list_deployments().await?,
            ),
            Self::DeploymentGet { deployment_uuid } => resource(
                &client
                    .get_deployment(&DeploymentId::new(deployment_uuid))
                    .await?,
            ),
            Self::DeploymentRecreate { deployment_uuid } => resource(
                &client
                    .recreate_deployment(&DeploymentId::new(deployment_uuid))
                    .await?,
            ),
            Self::DeploymentDelete { deployment_uuid } => {
                client
                    .delete_deployment(&DeploymentId::new(deployment_uuid))
                    .await?;
                Ok(deleted())
            }

            Self::TaskCreate {
                task_filename,
                task_params,
                tag,
                deployment_uuid,
                abort_on_sla_failure,
            } => {
                let mut request = CreateTaskRequest::new(
                    Some(DeploymentId::new(deployment_uuid)),
                    read_task_file(&task_filename).await?,
                );
                request.task_params = task_params.into_iter().collect::<Map<_, _>>();
                request.tag = tag;
                request.abort_on_sla_failure = abort_on_sla_failure;
                resource(&client.create_task(&request).await?)
            }
            Self::TaskList => collection(Collection::Tasks, &client.list_tasks().await?),
            Self::TaskGet { task_uuid } => {
                resource(&client.get_task(&TaskId::new(task_uuid)).await?)
            }
            Self::TaskLog {
                task_uuid,
                start_line,
                end_line,
            } => {
                let slice = client
                    .task_log(&TaskId::new(task_uuid), start_line, end_line)
                    .await?;
                Ok(Output::Text {
                    text: slice.data.concat(),
                    json: serde_json::to_value(&slice)?,
                })
            }
            Self::TaskResult {
                task_uuid,
                download_dir,
            } => {
                let path = client
                    .download_task_result(&TaskId::new(task_uuid), &download_dir)
                    .await?;
                Ok(Output::Downloaded(vec![path]))
            }
            Self::TaskReport {
                task_uuid,
                report_format,
                download_dir,
            } => {
                let path = client
                    .download_task_report(&TaskId::new(task_uuid), report_format, &download_dir)
                    .await?;
                Ok(Output::Downloaded(vec![path]))
            }
            Self::TaskDelete { task_uuid, force } => {
                client.delete_task(&TaskId::new(task_uuid), force).await?;
                Ok(deleted())
            }

            Self::RunStart {
                task_filenames,
                deployment_uuid,
                tag,
                abort_on_sla_failure,
            } => {
                let mut tasks = Vec::with_capacity(task_filenames.len());
                for file in &task_filenames {
                    let mut task = CreateTaskRequest::new(None, read_task_file(file).await?);
                    task.tag.clone_from(&tag);
                    task.abort_on_sla_failure = abort_on_sla_failure;
                    tasks.push(task);
                }
                let request = StartRunRequest {
                    deployment_uuid: Some(DeploymentId::new(deployment_uuid)),
                    tasks,
                };
                resource(&client.start_run(&request).await?)
            }
            Self::RunList => collection(Collection::Runs, &client.list_runs().await?),
            Self::RunGet { run_id } => resource(&client.get_run(&RunId::new(run_id)).await?),
            Self::RunResult {
                run_id,
                download_dir,
            } => {
                let results = client.run_results(&RunId::new(run_id)).await?;
                let Some(dir) = download_dir else {
                    return Ok(Output::Text {
                        text: results.results.join("\n"),
                        json: serde_json::to_value(&results)?,
                    });
                };
                let mut paths = Vec::with_capacity(results.results.len());
                for name in &results.results {
                    paths.push(client.download_result_file(name, &dir).await?);
                }
                Ok(Output::Downloaded(paths))
            }

            Self::TempestInstall {
                deployment_uuid,
                tempest_source,
            } => message(
                &client
                    .install_tempest(
                        &DeploymentId::new(deployment_uuid),
                        tempest_source.as_deref(),
                    )
                    .await?,
            ),
            Self::TempestCheck { deployment_uuid } => resource(
                &client
                    .tempest_status(&DeploymentId::new(deployment_uuid))
                    .await?,
            ),
            Self::TempestReinstall { deployment_uuid } => message(
                &client
                    .reinstall_tempest(&DeploymentId::new(deployment_uuid))
                    .await?,
            ),
            Self::TempestUninstall { deployment_uuid } => {
                client
                    .uninstall_tempest(&DeploymentId::new(deployment_uuid))
                    .await?;
                Ok(deleted())
            }

            Self::VerificationStart {
                deployment_uuid,
                set_name,
                regex,
                tempest_config,
            } => {
                let request = RunVerificationRequest {
                    deployment_uuid: DeploymentId::new(deployment_uuid),
                    set_name,
                    regex,
                    tempest_config,
                };
                resource(&client.start_verification(&request).await?)
            }
            Self::VerificationList => collection(
                Collection::Verifications,
                &client.list_verifications().await?,
            ),
            Self::VerificationGet { verification_uuid } => resource(
                &client
                    .get_verification(&VerificationId::new(verification_uuid))
                    .await?,
            ),
            Self::VerificationResult {
                verification_uuid,
                detailed,
            } => {
                let id = VerificationId::new(verification_uuid);
                if detailed {
                    let raw = client.verification_result_detailed(&id).await?;
                    return Ok(Output::Text {
                        text: serde_json::to_string_pretty(&raw)?,
                        json: raw,
                    });
                }
                resource(&client.verification_result(&id).await?)
            }
            Self::VerificationReport {
                verification_uuid,
                report_format,
                download_dir,
            } => {
                let path = client
                    .download_verification_report(
                        &VerificationId::new(verification_uuid),
                        report_format,
                        &download_dir,
                    )
                    .await?;
                Ok(Output::Downloaded(vec![path]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn task_params_parse_json_or_string() {
        assert_eq!(
            parse_task_param("times=10").unwrap(),
            ("times".to_string(), json!(10))
        );
        assert_eq!(
            parse_task_param("flavor=m1.tiny").unwrap(),
            ("flavor".to_string(), json!("m1.tiny"))
        );
        assert_eq!(
            parse_task_param("url=http://x/?a=b").unwrap(),
            ("url".to_string(), json!("http://x/?a=b"))
        );
        assert!(parse_task_param("novalue").is_err());
        assert!(parse_task_param("=1").is_err());
    }

    #[test]
    fn report_formats_are_validated() {
        assert_eq!(parse_task_format("JUNIT"), Ok(TaskReportFormat::Junit));
        assert!(parse_verification_format("pdf").is_err());
    }

    #[test]
    fn missing_credentials_name_the_env_var() {
        let err = require(None, "password", "OS_PASSWORD").unwrap_err();
        assert!(err.to_string().contains("OS_PASSWORD"));
        assert_eq!(require(Some("x".into()), "password", "OS_PASSWORD").unwrap(), "x");
    }
}
