//! Interpreting toolkit output: listing rows, JSON documents, and the UUIDs
//! printed by long-running commands.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use rallyd_types::{
    DeploymentId, DeploymentRecord, TaskId, TaskRecord, TaskStatus, VerificationId,
    VerificationRecord,
};

use crate::error::RallyError;
use crate::table::Table;

type Row = HashMap<String, String>;

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
            .expect("valid UUID regex")
    })
}

/// The UUID a long-running command announced for `keyword`, skipping
/// `exclude`.
///
/// The `<Keyword> <uuid>: started` header wins; otherwise the first UUID on
/// any line mentioning `keyword`. `rally task start` echoes the input task and
/// the deployment UUID before the header, so the deployment is passed as
/// `exclude`.
#[must_use]
pub fn find_uuid(text: &str, keyword: &str, exclude: Option<&str>) -> Option<String> {
    let keyword = keyword.to_ascii_lowercase();
    let lines: Vec<String> = text.lines().map(str::to_ascii_lowercase).collect();

    let header = lines
        .iter()
        .filter(|line| line.trim_start().starts_with(&keyword) && line.contains("started"));
    let mentions = lines.iter().filter(|line| line.contains(&keyword));
    first_uuid(header, exclude).or_else(|| first_uuid(mentions, exclude))
}

fn first_uuid<'a>(
    lines: impl Iterator<Item = &'a String>,
    exclude: Option<&str>,
) -> Option<String> {
    lines
        .flat_map(|line| uuid_regex().find_iter(line))
        .map(|m| m.as_str())
        .find(|uuid| exclude.is_none_or(|ex| !uuid.eq_ignore_ascii_case(ex)))
        .map(ToString::to_string)
}

fn rows(stdout: &str) -> Vec<Row> {
    Table::parse(stdout).map(|t| t.records()).unwrap_or_default()
}

fn take(row: &mut Row, key: &str) -> Option<String> {
    row.remove(key)
}

pub fn deployments(stdout: &str) -> Vec<DeploymentRecord> {
    rows(stdout)
        .into_iter()
        .filter_map(|mut row| {
            let uuid = take(&mut row, "uuid")?;
            Some(DeploymentRecord {
                uuid: DeploymentId::new(uuid),
                name: take(&mut row, "name"),
                status: take(&mut row, "status"),
                created_at: take(&mut row, "created_at"),
                active: take(&mut row, "active"),
                config: None,
            })
        })
        .collect()
}

pub fn tasks(stdout: &str) -> Vec<TaskRecord> {
    rows(stdout)
        .into_iter()
        .filter_map(|mut row| {
            let uuid = take(&mut row, "uuid")?;
            let status = take(&mut row, "status").map_or(TaskStatus::Init, |s| TaskStatus::parse(&s));
            Some(TaskRecord {
                uuid: TaskId::new(uuid),
                deployment_name: take(&mut row, "deployment_name"),
                tag: take(&mut row, "tag"),
                status,
                created_at: take(&mut row, "created_at"),
                duration: take(&mut row, "duration"),
            })
        })
        .collect()
}

pub fn verifications(stdout: &str) -> Vec<VerificationRecord> {
    rows(stdout)
        .into_iter()
        .filter_map(|mut row| {
            let uuid = take(&mut row, "uuid")?;
            Some(VerificationRecord {
                uuid: VerificationId::new(uuid),
                deployment_uuid: take(&mut row, "deployment_uuid").map(DeploymentId::new),
                set_name: take(&mut row, "set_name"),
                status: take(&mut row, "status"),
                tests: take(&mut row, "tests"),
                failures: take(&mut row, "failures"),
                errors: take(&mut row, "errors"),
                created_at: take(&mut row, "created_at"),
                duration: take(&mut row, "duration"),
            })
        })
        .collect()
}

/// Parse a JSON document, skipping any log lines the toolkit printed first.
pub fn json_document(command: &str, stdout: &str) -> Result<Value, RallyError> {
    let trimmed = stdout.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let start = trimmed
        .find(['{', '['])
        .ok_or_else(|| RallyError::UnexpectedOutput {
            command: command.to_string(),
            message: "no JSON document in output".to_string(),
        })?;
    serde_json::from_str(&trimmed[start..]).map_err(|e| RallyError::UnexpectedOutput {
        command: command.to_string(),
        message: format!("invalid JSON: {e}"),
    })
}

/// Phrases the toolkit uses when a deployment, task or verification is unknown.
const NOT_FOUND_MARKERS: &[&str] = &["not found", "can't find", "cannot find", "does not exist"];

/// Turn a failed command that complained about a missing resource into `NotFound`.
pub fn classify_not_found(err: RallyError, kind: &'static str, id: &str) -> RallyError {
    match err {
        RallyError::CommandFailed { ref stderr, .. } => {
            let lower = stderr.to_ascii_lowercase();
            if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
                RallyError::not_found(kind, id)
            } else {
                err
            }
        }
        other => other,
    }
}
