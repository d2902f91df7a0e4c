use crate::common::{DEFAULT_DEPLOYMENT, TestServer};

#[tokio::test]
async fn verification_needs_tempest() {
    let server = TestServer::start().await;
    let out = server.cli(&["verification-start", DEFAULT_DEPLOYMENT]).await;
    assert!(!out.success);
    assert!(out.stderr.contains("Tempest is not installed"), "{}", out.stderr);
}

#[tokio::test]
async fn verification_flow() {
    let server = TestServer::start().await;
    server
        .cli(&["tempest-install", DEFAULT_DEPLOYMENT])
        .await;

    let record = server
        .cli_json(&["verification-start", DEFAULT_DEPLOYMENT, "--set-name", "compute"])
        .await;
    assert_eq!(record["set_name"], "compute");
    let uuid = record["uuid"].as_str().unwrap().to_string();

    let out = server.cli(&["verification-list"]).await;
    assert!(out.success, "{}", out.stderr);
    assert!(out.stdout.contains("| set_name"));
    assert!(out.stdout.contains(&uuid));

    let fetched = server.cli_json(&["verification-get", &uuid]).await;
    assert_eq!(fetched["uuid"], uuid.as_str());

    let summary = server.cli_json(&["verification-result", &uuid]).await;
    assert_eq!(summary["status"], "running");
    let detailed = server
        .cli_json(&["verification-result", &uuid, "--detailed"])
        .await;
    assert!(detailed["test_cases"].is_object());

    let dir = server.scratch().join("tempest");
    let out = server
        .cli(&[
            "verification-report",
            &uuid,
            "--report-format",
            "json",
            "--download-dir",
            dir.to_str().unwrap(),
        ])
        .await;
    assert!(out.success, "{}", out.stderr);
    assert!(dir.join(format!("tempest_{uuid}.json")).exists());
}
