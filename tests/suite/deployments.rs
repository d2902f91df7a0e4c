use crate::common::{DEFAULT_DEPLOYMENT, TestServer};

#[tokio::test]
async fn deployment_list_prints_table() {
    let server = TestServer::start().await;
    let out = server.cli(&["deployment-list"]).await;
    assert!(out.success, "{}", out.stderr);
    assert!(out.stdout.contains("| uuid "));
    assert!(out.stdout.contains("| name "));
    assert!(out.stdout.contains(DEFAULT_DEPLOYMENT));
}

#[tokio::test]
async fn deployment_create_and_get() {
    let server = TestServer::start().await;
    let created = server
        .cli_json(&[
            "deployment-create",
            "--auth-url",
            "http://keystone.example:5000/v2.0",
            "--username",
            "admin",
            "--password",
            "cli-secret-password",
            "--tenant-name",
            "admin",
            "--name",
            "lab",
        ])
        .await;
    assert_eq!(created["name"], "lab");
    let uuid = created["uuid"].as_str().unwrap().to_string();

    let out = server.cli(&["deployment-get", &uuid]).await;
    assert!(out.success, "{}", out.stderr);
    assert!(out.stdout.contains("| Property"));
    assert!(out.stdout.contains("keystone.example"));
    assert!(!out.stdout.contains("cli-secret-password"));

    let out = server.cli(&["deployment-delete", &uuid]).await;
    assert!(out.success, "{}", out.stderr);
    assert_eq!(out.stdout.trim(), "Deleted");
}

#[tokio::test]
async fn deployment_create_needs_credentials() {
    let server = TestServer::start().await;
    let out = server
        .cli(&["deployment-create", "--auth-url", "http://k", "--username", "u"])
        .await;
    assert!(!out.success);
    assert!(out.stderr.contains("OS_PASSWORD"), "{}", out.stderr);
}

#[tokio::test]
async fn recreate_db_prints_message() {
    let server = TestServer::start().await;
    let out = server.cli(&["recreate-db"]).await;
    assert!(out.success, "{}", out.stderr);
    assert_eq!(out.stdout.trim(), "Db recreated");
    assert_eq!(server.fake.db_recreations().await, 1);
}

#[tokio::test]
async fn tempest_commands() {
    let server = TestServer::start().await;
    let check = server
        .cli_json(&["tempest-check", DEFAULT_DEPLOYMENT])
        .await;
    assert_eq!(check["Installed"], false);

    let out = server
        .cli(&["tempest-install", DEFAULT_DEPLOYMENT])
        .await;
    assert!(out.success, "{}", out.stderr);
    assert_eq!(out.stdout.trim(), "Start installing tempest");

    let check = server
        .cli_json(&["tempest-check", DEFAULT_DEPLOYMENT])
        .await;
    assert_eq!(check["Installed"], true);

    let out = server
        .cli(&["tempest-reinstall", DEFAULT_DEPLOYMENT])
        .await;
    assert_eq!(out.stdout.trim(), "Tempest reinstalled");

    let out = server
        .cli(&["tempest-uninstall", DEFAULT_DEPLOYMENT])
        .await;
    assert!(out.success, "{}", out.stderr);
}
