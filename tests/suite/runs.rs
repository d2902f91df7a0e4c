use rallyd_types::{TaskId, TaskStatus};

use crate::common::{DEFAULT_DEPLOYMENT, TestServer, dummy_task};

#[tokio::test]
async fn run_start_list_and_results() {
    let server = TestServer::start().await;
    let first = server.write_task_file("first.json", &dummy_task());
    let second = server.write_task_file("second.json", &dummy_task());

    let run = server
        .cli_json(&[
            "run-start",
            DEFAULT_DEPLOYMENT,
            first.to_str().unwrap(),
            second.to_str().unwrap(),
            "--tag",
            "batch",
        ])
        .await;
    assert_eq!(run["state"], "running");
    let id = run["id"].as_str().unwrap().to_string();
    let tasks = run["task_ids"].as_array().unwrap().clone();
    assert_eq!(tasks.len(), 2);

    let started = server.fake.started_tasks().await;
    assert!(started.iter().all(|t| t.tag.as_deref() == Some("batch")));

    for task in &tasks {
        server
            .fake
            .set_task_status(&TaskId::new(task.as_str().unwrap()), TaskStatus::Finished)
            .await;
    }

    let out = server.cli(&["run-list"]).await;
    assert!(out.success, "{}", out.stderr);
    assert!(out.stdout.contains(&id));
    assert!(out.stdout.contains("finished"));

    let fetched = server.cli_json(&["run-get", &id]).await;
    assert_eq!(fetched["state"], "finished");

    let out = server.cli(&["run-result", &id]).await;
    assert!(out.success, "{}", out.stderr);
    assert_eq!(out.stdout.lines().count(), 2);
    assert!(out.stdout.lines().all(|l| l.starts_with(&format!("run_{id}_"))));

    let dir = server.scratch().join("reports");
    let out = server
        .cli(&["run-result", &id, "--download-dir", dir.to_str().unwrap()])
        .await;
    assert!(out.success, "{}", out.stderr);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
}

#[tokio::test]
async fn unknown_run_fails() {
    let server = TestServer::start().await;
    let out = server.cli(&["run-get", "missing"]).await;
    assert!(!out.success);
    assert!(out.stderr.contains("404"), "{}", out.stderr);
}
