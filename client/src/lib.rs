//! Client library for the rallyd HTTP API.
//!
//! One method per endpoint. JSON endpoints decode into `rallyd-types`; file
//! endpoints return raw bytes, and the `download_*` helpers save them the way
//! the `rallyd-client` CLI names them.

mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use rallyd_types::{
    ApiMap, CreateDeploymentRequest, CreateTaskRequest, DeploymentId, DeploymentList,
    DeploymentRecord, LogSlice, Message, Run, RunId, RunList, RunResults, RunVerificationRequest,
    StartRunRequest, TaskId, TaskList, TaskRecord, TaskReportFormat, TempestStatus,
    VerificationId, VerificationList, VerificationRecord, VerificationReportFormat,
};

pub use error::{ClientError, MAX_ERROR_BODY_BYTES};

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct RallydClient {
    http: reqwest::Client,
    base: Url,
}

impl RallydClient {
    /// `endpoint` may carry a path prefix; routes are appended to it.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        let base = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("expected an http(s) URL".to_string()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .map_err(ClientError::Http)?;
        Ok(Self { http, base })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`: the base can always take path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        tracing::debug!(%method, %url, "rallyd request");
        self.http.request(method, url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(ClientError::Http)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = error::read_capped_error_body(response).await;
        tracing::debug!(status = status.as_u16(), "rallyd request rejected");
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(ClientError::Decode)
    }

    async fn bytes(&self, request: RequestBuilder) -> Result<Vec<u8>, ClientError> {
        let body = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(ClientError::Decode)?;
        Ok(body.to_vec())
    }

    async fn empty(&self, request: RequestBuilder) -> Result<(), ClientError> {
        self.send(request).await.map(drop)
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        self.request(Method::GET, segments)
    }

    fn post<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> RequestBuilder {
        self.request(Method::POST, segments).json(body)
    }

    fn put(&self, segments: &[&str]) -> RequestBuilder {
        self.request(Method::PUT, segments)
    }

    fn delete(&self, segments: &[&str]) -> RequestBuilder {
        self.request(Method::DELETE, segments)
    }

    pub async fn api_map(&self) -> Result<ApiMap, ClientError> {
        self.json(self.get(&["api_map"])).await
    }

    pub async fn recreate_db(&self) -> Result<Message, ClientError> {
        self.json(self.request(Method::POST, &["db"])).await
    }

    // Deployments

    pub async fn create_deployment(
        &self,
        request: &CreateDeploymentRequest,
    ) -> Result<DeploymentRecord, ClientError> {
        self.json(self.post(&["deployments"], request)).await
    }

    pub async fn list_deployments(&self) -> Result<DeploymentList, ClientError> {
        self.json(self.get(&["deployments"])).await
    }

    pub async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentRecord, ClientError> {
        self.json(self.get(&["deployments", id.as_str()])).await
    }

    pub async fn recreate_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<DeploymentRecord, ClientError> {
        self.json(self.put(&["deployments", id.as_str()])).await
    }

    pub async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), ClientError> {
        self.empty(self.delete(&["deployments", id.as_str()])).await
    }

    // Tempest

    pub async fn install_tempest(
        &self,
        id: &DeploymentId,
        tempest_source: Option<&str>,
    ) -> Result<Message, ClientError> {
        let body = json!({ "tempest_source": tempest_source });
        self.json(self.post(&["deployments", id.as_str(), "tempest"], &body))
            .await
    }

    pub async fn tempest_status(&self, id: &DeploymentId) -> Result<TempestStatus, ClientError> {
        self.json(self.get(&["deployments", id.as_str(), "tempest"]))
            .await
    }

    pub async fn reinstall_tempest(&self, id: &DeploymentId) -> Result<Message, ClientError> {
        self.json(self.put(&["deployments", id.as_str(), "tempest"]))
            .await
    }

    pub async fn uninstall_tempest(&self, id: &DeploymentId) -> Result<(), ClientError> {
        self.empty(self.delete(&["deployments", id.as_str(), "tempest"]))
            .await
    }

    // Tasks

    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskRecord, ClientError> {
        self.json(self.post(&["tasks"], request)).await
    }

    pub async fn list_tasks(&self) -> Result<TaskList, ClientError> {
        self.json(self.get(&["tasks"])).await
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<TaskRecord, ClientError> {
        self.json(self.get(&["tasks", id.as_str()])).await
    }

    pub async fn delete_task(&self, id: &TaskId, force: bool) -> Result<(), ClientError> {
        let mut request = self.delete(&["tasks", id.as_str()]);
        if force {
            request = request.query(&[("force", "true")]);
        }
        self.empty(request).await
    }

    /// Lines `start..end` of the task log. `start` defaults to the last ten lines.
    pub async fn task_log(
        &self,
        id: &TaskId,
        start_line: Option<i64>,
        end_line: Option<i64>,
    ) -> Result<LogSlice, ClientError> {
        let start = start_line.unwrap_or(rallyd_types::DEFAULT_LOG_START_LINE);
        let mut query = vec![("start_line", start.to_string())];
        if let Some(end) = end_line {
            query.push(("end_line", end.to_string()));
        }
        self.json(self.get(&["tasks", id.as_str(), "log"]).query(&query))
            .await
    }

    pub async fn task_result(&self, id: &TaskId) -> Result<Vec<u8>, ClientError> {
        self.bytes(self.get(&["tasks", id.as_str(), "result"])).await
    }

    pub async fn task_report(
        &self,
        id: &TaskId,
        format: TaskReportFormat,
    ) -> Result<Vec<u8>, ClientError> {
        let request = self
            .get(&["tasks", id.as_str(), "report"])
            .query(&[("format", format.as_str())]);
        self.bytes(request).await
    }

    // Runs

    pub async fn start_run(&self, request: &StartRunRequest) -> Result<Run, ClientError> {
        self.json(self.post(&["runs"], request)).await
    }

    pub async fn list_runs(&self) -> Result<RunList, ClientError> {
        self.json(self.get(&["runs"])).await
    }

    pub async fn get_run(&self, id: &RunId) -> Result<Run, ClientError> {
        self.json(self.get(&["runs", id.as_str()])).await
    }

    pub async fn run_results(&self, id: &RunId) -> Result<RunResults, ClientError> {
        self.json(self.get(&["runs", id.as_str(), "result"])).await
    }

    pub async fn result_file(&self, filename: &str) -> Result<Vec<u8>, ClientError> {
        self.bytes(self.get(&["result", filename])).await
    }

    // Verifications

    pub async fn start_verification(
        &self,
        request: &RunVerificationRequest,
    ) -> Result<VerificationRecord, ClientError> {
        self.json(self.post(&["verifications"], request)).await
    }

    pub async fn list_verifications(&self) -> Result<VerificationList, ClientError> {
        self.json(self.get(&["verifications"])).await
    }

    pub async fn get_verification(
        &self,
        id: &VerificationId,
    ) -> Result<VerificationRecord, ClientError> {
        self.json(self.get(&["verifications", id.as_str()])).await
    }

    /// Summary record of a verification.
    pub async fn verification_result(
        &self,
        id: &VerificationId,
    ) -> Result<VerificationRecord, ClientError> {
        self.json(self.get(&["verifications", id.as_str(), "result"]))
            .await
    }

    /// Raw results as reported by the toolkit.
    pub async fn verification_result_detailed(
        &self,
        id: &VerificationId,
    ) -> Result<Value, ClientError> {
        let request = self
            .get(&["verifications", id.as_str(), "result"])
            .query(&[("detailed", "1")]);
        self.json(request).await
    }

    pub async fn verification_report(
        &self,
        id: &VerificationId,
        format: VerificationReportFormat,
    ) -> Result<Vec<u8>, ClientError> {
        let request = self
            .get(&["verifications", id.as_str(), "report"])
            .query(&[("report_format", format.as_str())]);
        self.bytes(request).await
    }

    // Downloads

    /// Save the detailed result as `<uuid>-detailed-result.log`.
    pub async fn download_task_result(
        &self,
        id: &TaskId,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let bytes = self.task_result(id).await?;
        save(dir.join(format!("{id}-detailed-result.log")), bytes).await
    }

    /// Save a task report as `<uuid>.<format>`.
    pub async fn download_task_report(
        &self,
        id: &TaskId,
        format: TaskReportFormat,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let bytes = self.task_report(id, format).await?;
        save(dir.join(format!("{id}.{format}")), bytes).await
    }

    /// Save a verification report as `tempest_<uuid>.<format>`.
    pub async fn download_verification_report(
        &self,
        id: &VerificationId,
        format: VerificationReportFormat,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let bytes = self.verification_report(id, format).await?;
        save(dir.join(format!("tempest_{id}.{format}")), bytes).await
    }

    /// Save a generated result file under its own name.
    pub async fn download_result_file(
        &self,
        filename: &str,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let bytes = self.result_file(filename).await?;
        let name = Path::new(filename)
            .file_name()
            .map_or_else(|| filename.to_string(), |n| n.to_string_lossy().into_owned());
        save(dir.join(name), bytes).await
    }
}

async fn save(path: PathBuf, bytes: Vec<u8>) -> Result<PathBuf, ClientError> {
    tokio::task::spawn_blocking(move || {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            rallyd_utils::atomic_write(&path, &bytes)
        };
        match write() {
            Ok(()) => Ok(path),
            Err(source) => Err(ClientError::Io { path, source }),
        }
    })
    .await
    .map_err(|e| ClientError::Io {
        path: PathBuf::new(),
        source: std::io::Error::other(e),
    })?
}

#[cfg(test)]
mod tests;
