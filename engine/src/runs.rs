//! In-memory grouping of tasks into runs.
//!
//! Runs exist only in this process: they are not persisted and a restart
//! forgets them, while the tasks themselves stay in the toolkit's database.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;

use rallyd_types::{Run, RunId, RunState, StartRunRequest, TaskId, TaskStatus};

use crate::backend::RallyBackend;
use crate::error::RallyError;
use crate::workdir::Workdir;

pub struct RunRegistry {
    backend: Arc<dyn RallyBackend>,
    workdir: Workdir,
    /// In creation order.
    runs: RwLock<Vec<Run>>,
}

impl std::fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRegistry")
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl RunRegistry {
    #[must_use]
    pub fn new(backend: Arc<dyn RallyBackend>, workdir: Workdir) -> Self {
        Self {
            backend,
            workdir,
            runs: RwLock::new(Vec::new()),
        }
    }

    /// Start every task of the run concurrently.
    ///
    /// The run is registered before any task launches. Tasks that fail to
    /// launch are recorded in `errors`; the run only fails outright when none
    /// of them started.
    pub async fn start(&self, request: StartRunRequest) -> Result<Run, RallyError> {
        if request.tasks.is_empty() {
            return Err(RallyError::invalid("a run needs at least one task"));
        }

        let id = RunId::generate();
        self.runs.write().await.push(Run::new(id.clone()));

        let tasks = request.resolved_tasks();
        let launches = tasks.iter().map(|task| self.backend.start_task(task));
        let outcomes = join_all(launches).await;

        let mut task_ids = Vec::new();
        let mut errors = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(record) => task_ids.push(record.uuid),
                Err(e) => {
                    tracing::warn!(run = %id, task = index, "Task failed to launch: {e}");
                    errors.push(format!("task {index}: {e}"));
                }
            }
        }

        let mut runs = self.runs.write().await;
        let run = runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RallyError::internal(format!("run {id} vanished during start")))?;
        run.state = if task_ids.is_empty() {
            RunState::Failed
        } else {
            RunState::Running
        };
        run.task_ids = task_ids;
        run.errors = errors;
        tracing::info!(
            run = %id,
            launched = run.task_ids.len(),
            failed = run.errors.len(),
            "Run started"
        );
        Ok(run.clone())
    }

    /// The run with its state refreshed from the backend.
    pub async fn get(&self, id: &RunId) -> Result<Run, RallyError> {
        let run = self
            .runs
            .read()
            .await
            .iter()
            .find(|r| r.id == *id)
            .cloned()
            .ok_or_else(|| RallyError::not_found("run", id.as_str()))?;
        let statuses = self.task_statuses(std::slice::from_ref(&run)).await?;
        Ok(self.refresh(run, &statuses).await)
    }

    /// Every run, refreshed from a single task listing.
    pub async fn list(&self) -> Result<Vec<Run>, RallyError> {
        let snapshot: Vec<Run> = self.runs.read().await.clone();
        let statuses = self.task_statuses(&snapshot).await?;

        let mut refreshed = Vec::with_capacity(snapshot.len());
        for run in snapshot {
            refreshed.push(self.refresh(run, &statuses).await);
        }
        Ok(refreshed)
    }

    /// Generate an HTML report for each task and return the file names.
    pub async fn results(&self, id: &RunId) -> Result<Vec<String>, RallyError> {
        let run = self.get(id).await?;
        let mut names = Vec::with_capacity(run.task_ids.len());
        for task in &run.task_ids {
            let out = self.workdir.run_report(&run.id, task)?;
            let path = self.backend.task_report_to(task, out).await?;
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Re-aggregate a run's state. A failed launch stays failed.
    ///
    /// A task missing from `statuses` was deleted behind our back.
    async fn refresh(&self, mut run: Run, statuses: &HashMap<TaskId, TaskStatus>) -> Run {
        if run.task_ids.is_empty() {
            return run;
        }

        let current: Vec<TaskStatus> = run
            .task_ids
            .iter()
            .map(|task| {
                statuses
                    .get(task)
                    .cloned()
                    .unwrap_or_else(|| TaskStatus::Other("deleted".to_string()))
            })
            .collect();
        let state = RunState::aggregate(&current);

        if state != run.state {
            tracing::debug!(run = %run.id, from = %run.state, to = %state, "Run state changed");
            run.state = state;
            if let Some(stored) = self.runs.write().await.iter_mut().find(|r| r.id == run.id) {
                stored.state = state;
            }
        }
        run
    }

    /// Current task statuses, one toolkit listing per call. Skips the listing
    /// when none of `runs` launched a task.
    async fn task_statuses(&self, runs: &[Run]) -> Result<HashMap<TaskId, TaskStatus>, RallyError> {
        if runs.iter().all(|r| r.task_ids.is_empty()) {
            return Ok(HashMap::new());
        }
        Ok(self
            .backend
            .list_tasks()
            .await?
            .into_iter()
            .map(|task| (task.uuid, task.status))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use rallyd_types::{CreateTaskRequest, DeploymentId};

    use super::*;
    use crate::fake::FakeRally;

    fn fake() -> (tempfile::TempDir, Arc<FakeRally>) {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeRally::new(Workdir::new(dir.path())));
        (dir, fake)
    }

    fn registry(fake: &Arc<FakeRally>) -> RunRegistry {
        let backend: Arc<dyn RallyBackend> = fake.clone();
        RunRegistry::new(backend, fake.workdir().clone())
    }

    fn run_request(n: usize) -> StartRunRequest {
        StartRunRequest {
            deployment_uuid: Some(DeploymentId::new(FakeRally::DEFAULT_DEPLOYMENT)),
            tasks: (0..n)
                .map(|i| CreateTaskRequest::new(None, json!({"Dummy.dummy": [{"args": {"i": i}}]})))
                .collect(),
        }
    }

    #[tokio::test]
    async fn start_launches_every_task() {
        let (_dir, fake) = fake();
        let runs = registry(&fake);

        let run = runs.start(run_request(3)).await.unwrap();
        assert_eq!(run.task_ids.len(), 3);
        assert_eq!(run.state, RunState::Running);
        assert!(run.errors.is_empty());

        let launched = fake.started_tasks().await;
        assert_eq!(launched.len(), 3);
        assert!(launched.iter().all(|t| {
            t.deployment_uuid.as_ref().map(DeploymentId::as_str)
                == Some(FakeRally::DEFAULT_DEPLOYMENT)
        }));
    }

    #[tokio::test]
    async fn empty_run_is_rejected() {
        let (_dir, fake) = fake();
        let err = registry(&fake).start(run_request(0)).await.unwrap_err();
        assert!(matches!(err, RallyError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn partial_launch_records_errors() {
        let (_dir, fake) = fake();
        let runs = registry(&fake);
        let mut request = run_request(2);
        request.tasks[1].deployment_uuid = Some(DeploymentId::new("missing"));

        let run = runs.start(request).await.unwrap();
        assert_eq!(run.task_ids.len(), 1);
        assert_eq!(run.errors.len(), 1);
        assert!(run.errors[0].contains("task 1"));
        assert_eq!(run.state, RunState::Running);
    }

    #[tokio::test]
    async fn nothing_launched_fails_run() {
        let (_dir, fake) = fake();
        let runs = registry(&fake);
        let mut request = run_request(1);
        request.deployment_uuid = Some(DeploymentId::new("missing"));

        let run = runs.start(request).await.unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert!(run.task_ids.is_empty());
        assert_eq!(runs.get(&run.id).await.unwrap().state, RunState::Failed);
    }

    #[tokio::test]
    async fn state_follows_task_statuses() {
        let (_dir, fake) = fake();
        let runs = registry(&fake);
        let run = runs.start(run_request(2)).await.unwrap();

        fake.set_task_status(&run.task_ids[0], TaskStatus::Finished).await;
        assert_eq!(runs.get(&run.id).await.unwrap().state, RunState::Running);

        fake.set_task_status(&run.task_ids[1], TaskStatus::Finished).await;
        assert_eq!(runs.get(&run.id).await.unwrap().state, RunState::Finished);

        fake.set_task_status(&run.task_ids[1], TaskStatus::Crashed).await;
        let listed = runs.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, RunState::Failed);
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let (_dir, fake) = fake();
        let err = registry(&fake).get(&RunId::new("nope")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn results_generate_one_report_per_task() {
        let (_dir, fake) = fake();
        let runs = registry(&fake);
        let run = runs.start(run_request(2)).await.unwrap();

        let names = runs.results(&run.id).await.unwrap();
        assert_eq!(names.len(), 2);
        for (name, task) in names.iter().zip(&run.task_ids) {
            assert_eq!(name, &format!("run_{}_{}.html", run.id, task));
            assert!(fake.workdir().root().join(name).exists());
        }
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let (_dir, fake) = fake();
        let runs = registry(&fake);
        let first = runs.start(run_request(1)).await.unwrap();
        let second = runs.start(run_request(1)).await.unwrap();

        let ids: Vec<RunId> = runs.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
