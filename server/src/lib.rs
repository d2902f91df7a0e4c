//! HTTP facade over the rally benchmarking toolkit.
//!
//! Every handler delegates to a [`RallyBackend`]; the only state kept here is
//! the in-memory [`RunRegistry`]. See [`ROUTES`] for the full endpoint table.

pub mod error;
mod handlers;
mod request_tracing;


use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tokio::net::TcpListener;

use rallyd_engine::{RallyBackend, RunRegistry, Workdir};

pub use error::ApiError;
pub use request_tracing::REQUEST_ID_HEADER;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn RallyBackend>,
    pub runs: Arc<RunRegistry>,
    pub workdir: Workdir,
    request_id_seed: Arc<AtomicU64>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(backend: Arc<dyn RallyBackend>, workdir: Workdir) -> Self {
        let runs = Arc::new(RunRegistry::new(Arc::clone(&backend), workdir.clone()));
        Self {
            backend,
            runs,
            workdir,
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// One row of the endpoint table served by `GET /api_map`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiRoute {
    pub endpoint: &'static str,
    pub method: &'static str,
    pub path: &'static str,
}

const fn route(endpoint: &'static str, method: &'static str, path: &'static str) -> ApiRoute {
    ApiRoute {
        endpoint,
        method,
        path,
    }
}

/// Every route [`build_router`] serves.
pub const ROUTES: &[ApiRoute] = &[
    route("api_map", "GET", "/api_map"),
    route("recreate_db", "POST", "/db"),
    route("create_deployment", "POST", "/deployments"),
    route("list_deployments", "GET", "/deployments"),
    route("get_deployment", "GET", "/deployments/{uuid}"),
    route("recreate_deployment", "PUT", "/deployments/{uuid}"),
    route("delete_deployment", "DELETE", "/deployments/{uuid}"),
    route("install_tempest", "POST", "/deployments/{uuid}/tempest"),
    route("get_tempest_status", "GET", "/deployments/{uuid}/tempest"),
    route("reinstall_tempest", "PUT", "/deployments/{uuid}/tempest"),
    route("uninstall_tempest", "DELETE", "/deployments/{uuid}/tempest"),
    route("create_task", "POST", "/tasks"),
    route("list_tasks", "GET", "/tasks"),
    route("get_task", "GET", "/tasks/{uuid}"),
    route("delete_task", "DELETE", "/tasks/{uuid}"),
    route("get_task_log", "GET", "/tasks/{uuid}/log"),
    route("get_task_result", "GET", "/tasks/{uuid}/result"),
    route("get_task_report", "GET", "/tasks/{uuid}/report"),
    route("start_run", "POST", "/runs"),
    route("list_runs", "GET", "/runs"),
    route("get_run", "GET", "/runs/{id}"),
    route("get_run_results", "GET", "/runs/{id}/result"),
    route("get_result_file", "GET", "/result/{filename}"),
    route("run_verification", "POST", "/verifications"),
    route("list_verifications", "GET", "/verifications"),
    route("get_verification", "GET", "/verifications/{uuid}"),
    route("get_verification_results", "GET", "/verifications/{uuid}/result"),
    route("get_verification_report", "GET", "/verifications/{uuid}/report"),
];

/// Lines of `GET /api_map`, sorted by path.
#[must_use]
pub fn api_map() -> Vec<String> {
    let mut routes: Vec<&ApiRoute> = ROUTES.iter().collect();
    routes.sort_by(|a, b| (a.path, a.endpoint).cmp(&(b.path, b.endpoint)));
    routes
        .into_iter()
        .map(|r| format!("{:25} {:20} {}", r.endpoint, r.method, r.path))
        .collect()
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{deployments, files, runs, tasks, verifications};

    Router::new()
        .route("/api_map", get(handlers::api_map))
        .route("/db", post(handlers::recreate_db))
        .route(
            "/deployments",
            get(deployments::list).post(deployments::create),
        )
        .route(
            "/deployments/{uuid}",
            get(deployments::get)
                .put(deployments::recreate)
                .delete(deployments::destroy),
        )
        .route(
            "/deployments/{uuid}/tempest",
            get(deployments::tempest_status)
                .post(deployments::install_tempest)
                .put(deployments::reinstall_tempest)
                .delete(deployments::uninstall_tempest),
        )
        .route("/tasks", get(tasks::list).post(tasks::create))
        .route("/tasks/{uuid}", get(tasks::get).delete(tasks::delete))
        .route("/tasks/{uuid}/log", get(tasks::log))
        .route("/tasks/{uuid}/result", get(tasks::result))
        .route("/tasks/{uuid}/report", get(tasks::report))
        .route("/runs", get(runs::list).post(runs::start))
        .route("/runs/{id}", get(runs::get))
        .route("/runs/{id}/result", get(runs::results))
        .route("/result/{filename}", get(files::result_file))
        .route(
            "/verifications",
            get(verifications::list).post(verifications::start),
        )
        .route("/verifications/{uuid}", get(verifications::get))
        .route("/verifications/{uuid}/result", get(verifications::results))
        .route("/verifications/{uuid}/report", get(verifications::report))
        .layer(from_fn_with_state(
            state.clone(),
            request_tracing::request_tracing_middleware,
        ))
        .with_state(state)
}

/// Serve until `shutdown` resolves, letting in-flight requests finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
