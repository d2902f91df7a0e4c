//! Records and response envelopes returned by the HTTP API.
//!
//! Deployment, task and verification records are owned by the toolkit; the
//! facade only relays the columns it reports, so every field is optional.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{DeploymentId, RunId, TaskId, VerificationId};
use crate::status::{RunState, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub uuid: DeploymentId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub uuid: TaskId,
    #[serde(default)]
    pub deployment_name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

impl TaskRecord {
    #[must_use]
    pub fn new(uuid: TaskId, status: TaskStatus) -> Self {
        Self {
            uuid,
            deployment_name: None,
            tag: None,
            status,
            created_at: None,
            duration: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub uuid: VerificationId,
    #[serde(default)]
    pub deployment_uuid: Option<DeploymentId>,
    #[serde(default)]
    pub set_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tests: Option<String>,
    #[serde(default)]
    pub failures: Option<String>,
    #[serde(default)]
    pub errors: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

/// A group of tasks started together. Lives only in server memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub task_ids: Vec<TaskId>,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    /// Launch failures, one line per task that never got a UUID.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Run {
    #[must_use]
    pub fn new(id: RunId) -> Self {
        Self {
            id,
            task_ids: Vec::new(),
            state: RunState::New,
            created_at: Utc::now(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_uuid: Option<DeploymentId>,
}

impl Message {
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            deployment_uuid: None,
        }
    }

    #[must_use]
    pub fn for_deployment(msg: impl Into<String>, deployment_uuid: DeploymentId) -> Self {
        Self {
            msg: msg.into(),
            deployment_uuid: Some(deployment_uuid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempestStatus {
    #[serde(rename = "Installed")]
    pub installed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentList {
    pub deployments: Vec<DeploymentRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationList {
    pub verifications: Vec<VerificationRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunList {
    pub runs: Vec<Run>,
}

/// Report file names produced for a run, downloadable from `/result/{filename}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResults {
    pub results: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMap {
    pub map: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempest_status_uses_capitalized_key() {
        let json = serde_json::to_value(TempestStatus { installed: true }).unwrap();
        assert_eq!(json, serde_json::json!({"Installed": true}));
    }

    #[test]
    fn message_omits_missing_deployment() {
        let json = serde_json::to_value(Message::new("Db recreated")).unwrap();
        assert_eq!(json, serde_json::json!({"msg": "Db recreated"}));

        let json = serde_json::to_value(Message::for_deployment(
            "Tempest reinstalled",
            DeploymentId::new("d-1"),
        ))
        .unwrap();
        assert_eq!(json["deployment_uuid"], "d-1");
    }

    #[test]
    fn task_record_accepts_sparse_json() {
        let record: TaskRecord =
            serde_json::from_value(serde_json::json!({"uuid": "t-1", "status": "running"}))
                .unwrap();
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.tag.is_none());
    }

    #[test]
    fn new_run_starts_empty() {
        let run = Run::new(RunId::new("r-1"));
        assert_eq!(run.state, RunState::New);
        assert!(run.task_ids.is_empty());
        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("errors").is_none());
    }
}
