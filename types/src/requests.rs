//! Request bodies accepted by the HTTP API.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::DeploymentId;

pub const DEFAULT_VERIFICATION_SET: &str = "smoke";

/// Credentials for registering an existing cloud as a deployment.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeploymentRequest {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tenant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,
}

// Manual Debug impl to keep the admin password out of logs.
impl fmt::Debug for CreateDeploymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateDeploymentRequest")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("tenant_name", &self.tenant_name)
            .field("environment_name", &self.environment_name)
            .finish()
    }
}

impl CreateDeploymentRequest {
    /// Deployment config in the shape the toolkit expects for an existing cloud.
    #[must_use]
    pub fn existing_cloud_config(&self) -> Value {
        serde_json::json!({
            "type": "ExistingCloud",
            "auth_url": self.auth_url,
            "admin": {
                "username": self.username,
                "password": self.password,
                "tenant_name": self.tenant_name,
            }
        })
    }
}

/// Start a single benchmark task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_uuid: Option<DeploymentId>,
    pub task_config: Value,
    #[serde(default)]
    pub task_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub abort_on_sla_failure: bool,
}

impl CreateTaskRequest {
    #[must_use]
    pub fn new(deployment_uuid: Option<DeploymentId>, task_config: Value) -> Self {
        Self {
            deployment_uuid,
            task_config,
            task_params: Map::new(),
            tag: None,
            abort_on_sla_failure: false,
        }
    }
}

/// Start several tasks as one run.
///
/// Tasks that do not name a deployment inherit `deployment_uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRunRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_uuid: Option<DeploymentId>,
    pub tasks: Vec<CreateTaskRequest>,
}

impl StartRunRequest {
    /// Task requests with the run-level deployment filled in.
    #[must_use]
    pub fn resolved_tasks(&self) -> Vec<CreateTaskRequest> {
        self.tasks
            .iter()
            .cloned()
            .map(|mut task| {
                if task.deployment_uuid.is_none() {
                    task.deployment_uuid.clone_from(&self.deployment_uuid);
                }
                task
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallTempestRequest {
    #[serde(default)]
    pub tempest_source: Option<String>,
}

fn default_set_name() -> String {
    DEFAULT_VERIFICATION_SET.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunVerificationRequest {
    pub deployment_uuid: DeploymentId,
    #[serde(default = "default_set_name", deserialize_with = "set_name_or_default")]
    pub set_name: String,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub tempest_config: Option<String>,
}

// Clients send `"set_name": null` when the flag is omitted.
fn set_name_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(default_set_name))
}
