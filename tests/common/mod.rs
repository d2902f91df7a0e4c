//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::oneshot;

use rallyd_engine::{FakeRally, Workdir};
use rallyd_server::{AppState, serve};

pub const DEFAULT_DEPLOYMENT: &str = FakeRally::DEFAULT_DEPLOYMENT;

/// A rallyd server on an ephemeral port, stopped on drop.
pub struct TestServer {
    pub endpoint: String,
    pub fake: Arc<FakeRally>,
    dir: tempfile::TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let workdir_path = dir.path().join("workdir");
        std::fs::create_dir_all(&workdir_path).unwrap();
        let workdir = Workdir::new(&workdir_path);
        let fake = Arc::new(FakeRally::new(workdir.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let state = AppState::new(fake.clone(), workdir);
        tokio::spawn(async move {
            serve(listener, state, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
        });

        Self {
            endpoint: format!("http://{addr}"),
            fake,
            dir,
            shutdown: Some(tx),
        }
    }

    /// Scratch directory for task files and downloads.
    pub fn scratch(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_task_file(&self, name: &str, task: &Value) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, serde_json::to_vec_pretty(task).unwrap()).unwrap();
        path
    }

    /// Run `rallyd-client --endpoint <server> <args>`.
    pub async fn cli(&self, args: &[&str]) -> CliOutput {
        self.cli_at(&self.endpoint, args).await
    }

    /// Run against an arbitrary endpoint, keeping this server's scratch env.
    pub async fn cli_at(&self, endpoint: &str, args: &[&str]) -> CliOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_rallyd-client"))
            .arg("--endpoint")
            .arg(endpoint)
            .args(args)
            .env("RALLYD_CONFIG", self.dir.path().join("no-config.toml"))
            .env_remove("RALLYD_ENDPOINT")
            .env_remove("OS_AUTH_URL")
            .env_remove("OS_USERNAME")
            .env_remove("OS_PASSWORD")
            .env_remove("OS_TENANT_NAME")
            .env_remove("RUST_LOG")
            .output()
            .await
            .unwrap();
        CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// Run with `--json` and parse stdout.
    pub async fn cli_json(&self, args: &[&str]) -> Value {
        let mut full = vec!["--json"];
        full.extend_from_slice(args);
        let out = self.cli(&full).await;
        assert!(out.success, "rallyd-client {args:?} failed: {}", out.stderr);
        serde_json::from_str(out.stdout.trim()).unwrap_or_else(|e| {
            panic!("rallyd-client {args:?} printed invalid JSON ({e}): {}", out.stdout)
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug)]
pub struct CliOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub fn dummy_task() -> Value {
    serde_json::json!({
        "Dummy.dummy": [
            {"args": {"sleep": 0.1}, "runner": {"type": "constant", "times": 2, "concurrency": 1}}
        ]
    })
}
