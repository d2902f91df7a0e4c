use crate::common::TestServer;

#[tokio::test]
async fn unknown_task_reports_server_message() {
    let server = TestServer::start().await;
    let out = server.cli(&["task-get", "nope"]).await;
    assert!(!out.success);
    assert!(out.stderr.contains("rallyd returned 404: task nope not found"), "{}", out.stderr);
}

#[tokio::test]
async fn unreachable_server_is_an_error() {
    let server = TestServer::start().await;
    let out = server
        .cli_at("http://127.0.0.1:9", &["task-list"])
        .await;
    assert!(!out.success);
    assert!(out.stderr.contains("Request to rallyd failed"), "{}", out.stderr);
}

#[tokio::test]
async fn json_flag_prints_raw_envelope() {
    let server = TestServer::start().await;
    let listed = server.cli_json(&["task-list"]).await;
    assert_eq!(listed, serde_json::json!({"tasks": []}));
}

#[tokio::test]
async fn bad_report_format_is_rejected_locally() {
    let server = TestServer::start().await;
    let out = server
        .cli(&["task-report", "x", "--report-format", "pdf"])
        .await;
    assert!(!out.success);
    assert!(out.stderr.contains("pdf"), "{}", out.stderr);
}
