use std::path::Path;

use rallyd_types::{TaskId, TaskStatus};

use crate::common::{DEFAULT_DEPLOYMENT, TestServer, dummy_task};

async fn create_task(server: &TestServer) -> String {
    let file = server.write_task_file("task.json", &dummy_task());
    let created = server
        .cli_json(&[
            "task-create",
            DEFAULT_DEPLOYMENT,
            file.to_str().unwrap(),
            "--tag",
            "nightly",
            "--task-params",
            "times=5",
            "--task-params",
            "flavor=m1.tiny",
        ])
        .await;
    created["uuid"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn task_create_sends_params() {
    let server = TestServer::start().await;
    create_task(&server).await;

    let started = server.fake.started_tasks().await;
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].tag.as_deref(), Some("nightly"));
    assert_eq!(started[0].task_params["times"], 5);
    assert_eq!(started[0].task_params["flavor"], "m1.tiny");
    assert_eq!(started[0].task_config, dummy_task());
}

#[tokio::test]
async fn task_list_and_get() {
    let server = TestServer::start().await;
    let uuid = create_task(&server).await;

    let out = server.cli(&["task-list"]).await;
    assert!(out.success, "{}", out.stderr);
    assert!(out.stdout.contains(&uuid));
    assert!(out.stdout.contains("nightly"));

    let task = server.cli_json(&["task-get", &uuid]).await;
    assert_eq!(task["status"], "running");
}

#[tokio::test]
async fn task_log_defaults_to_tail() {
    let server = TestServer::start().await;
    let uuid = create_task(&server).await;

    let out = server.cli(&["task-log", &uuid]).await;
    assert!(out.success, "{}", out.stderr);
    assert_eq!(out.stdout.lines().count(), 10);

    let slice = server
        .cli_json(&["task-log", &uuid, "--start-line", "-3"])
        .await;
    assert_eq!(slice["data"].as_array().unwrap().len(), 3);
    assert_eq!(slice["from"], -3);
}

#[tokio::test]
async fn task_result_and_report_download() {
    let server = TestServer::start().await;
    let uuid = create_task(&server).await;
    let dir = server.scratch().join("downloads");
    let dir_arg = dir.to_str().unwrap();

    let out = server
        .cli(&["task-result", &uuid, "--download-dir", dir_arg])
        .await;
    assert!(out.success, "{}", out.stderr);
    let detailed = dir.join(format!("{uuid}-detailed-result.log"));
    assert!(out.stdout.contains(&detailed.display().to_string()));
    assert!(std::fs::read_to_string(&detailed).unwrap().contains(&uuid));

    let out = server
        .cli(&[
            "task-report",
            &uuid,
            "--report-format",
            "junit",
            "--download-dir",
            dir_arg,
        ])
        .await;
    assert!(out.success, "{}", out.stderr);
    assert!(Path::new(&dir.join(format!("{uuid}.junit"))).exists());
}

#[tokio::test]
async fn task_delete_requires_force_while_running() {
    let server = TestServer::start().await;
    let uuid = create_task(&server).await;

    let out = server.cli(&["task-delete", &uuid]).await;
    assert!(!out.success);
    assert!(out.stderr.contains("400"), "{}", out.stderr);

    server
        .fake
        .set_task_status(&TaskId::new(uuid.as_str()), TaskStatus::Finished)
        .await;
    let out = server.cli(&["task-delete", &uuid]).await;
    assert!(out.success, "{}", out.stderr);
}
