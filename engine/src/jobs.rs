//! Background work started on behalf of a request.
//!
//! Task runs, tempest installs and verifications outlive the request that
//! started them. Each is spawned here so that shutdown can abort them; the
//! aborted future drops its `ChildGuard`, which kills the toolkit's process
//! group.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: Mutex<JoinSet<()>>,
}

impl JobTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job`, reaping any jobs that already finished.
    pub async fn spawn<F>(&self, label: impl Into<String>, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let mut jobs = self.jobs.lock().await;
        while let Some(done) = jobs.try_join_next() {
            if let Err(e) = done
                && e.is_panic()
            {
                tracing::error!("Background job panicked: {e}");
            }
        }
        tracing::debug!(job = %label, active = jobs.len() + 1, "Spawning background job");
        jobs.spawn(async move {
            job.await;
            tracing::debug!(job = %label, "Background job finished");
        });
    }

    /// Jobs not yet reaped, finished or not.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Give running jobs `grace` to finish, then abort the rest.
    pub async fn shutdown(&self, grace: Duration) {
        let mut jobs = self.jobs.lock().await;
        if jobs.is_empty() {
            return;
        }
        tracing::info!(active = jobs.len(), "Stopping background jobs");

        let drained = tokio::time::timeout(grace, async {
            while jobs.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = jobs.len(), "Aborting background jobs");
            jobs.abort_all();
            while jobs.join_next().await.is_some() {}
        }
    }
}
