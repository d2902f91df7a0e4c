use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

const DEP: &str = "0b4bbc1f-2a8e-4a3f-9f8b-4f3b0f2c1d11";
const TASK: &str = "6f1c7a3e-1111-4c2a-8d9e-123456789abc";
const VERIFICATION: &str = "9a8b7c6d-2222-4e3f-8a9b-abcdefabcdef";

fn client(server: &MockServer) -> RallydClient {
    RallydClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

#[test]
fn rejects_non_http_endpoints() {
    assert!(matches!(
        RallydClient::new("not a url", Duration::from_secs(1)),
        Err(ClientError::InvalidEndpoint { .. })
    ));
    assert!(matches!(
        RallydClient::new("mailto:ops@example.com", Duration::from_secs(1)),
        Err(ClientError::InvalidEndpoint { .. })
    ));
}

#[test]
fn endpoint_prefix_is_kept() {
    let client = RallydClient::new("http://rally.example/api/", Duration::from_secs(1)).unwrap();
    assert_eq!(
        client.url(&["tasks", TASK, "log"]).as_str(),
        format!("http://rally.example/api/tasks/{TASK}/log")
    );
    let bare = RallydClient::new("http://rally.example", Duration::from_secs(1)).unwrap();
    assert_eq!(bare.url(&["db"]).as_str(), "http://rally.example/db");
}

#[test]
fn ids_are_path_escaped() {
    let client = RallydClient::new("http://rally.example", Duration::from_secs(1)).unwrap();
    assert_eq!(
        client.url(&["result", "../etc/passwd"]).as_str(),
        "http://rally.example/result/..%2Fetc%2Fpasswd"
    );
}

#[tokio::test]
async fn create_deployment_posts_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/deployments"))
        .and(body_json(json!({
            "auth_url": "http://keystone:5000/v2.0",
            "username": "admin",
            "password": "secret",
            "tenant_name": "admin"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "uuid": DEP,
            "name": "default-1",
            "status": "deploy->finished"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CreateDeploymentRequest {
        auth_url: Some("http://keystone:5000/v2.0".into()),
        username: Some("admin".into()),
        password: Some("secret".into()),
        tenant_name: Some("admin".into()),
        environment_name: None,
    };
    let record = client(&server).create_deployment(&request).await.unwrap();
    assert_eq!(record.uuid.as_str(), DEP);
    assert_eq!(record.status.as_deref(), Some("deploy->finished"));
}

#[tokio::test]
async fn task_log_sends_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/tasks/{TASK}/log")))
        .and(query_param("start_line", "-10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": TASK,
            "total_lines": 12,
            "from": -10,
            "to": null,
            "data": ["a\n", "b\n"]
        })))
        .mount(&server)
        .await;

    let slice = client(&server)
        .task_log(&TaskId::new(TASK), None, None)
        .await
        .unwrap();
    assert_eq!(slice.total_lines, 12);
    assert_eq!(slice.data, vec!["a\n", "b\n"]);
}

#[tokio::test]
async fn delete_task_with_force() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/tasks/{TASK}")))
        .and(query_param("force", "true"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .delete_task(&TaskId::new(TASK), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn error_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/tasks/{TASK}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "not_found", "message": format!("task {TASK} not found")}
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_task(&TaskId::new(TASK)).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.code().as_deref(), Some("not_found"));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn oversized_error_body_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(MAX_ERROR_BODY_BYTES * 2)))
        .mount(&server)
        .await;

    let err = client(&server).list_tasks().await.unwrap_err();
    let ClientError::Status { status, body } = err else {
        panic!("expected status error");
    };
    assert_eq!(status, 500);
    assert!(body.ends_with("...(truncated)"));
    assert!(body.len() < MAX_ERROR_BODY_BYTES + 32);
}

#[tokio::test]
async fn garbage_json_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).list_runs().await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn downloads_use_cli_file_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/tasks/{TASK}/result")))
        .respond_with(ResponseTemplate::new(200).set_body_string("detailed"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/tasks/{TASK}/report")))
        .and(query_param("format", "junit"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<testsuite/>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/verifications/{VERIFICATION}/report")))
        .and(query_param("report_format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    let client = client(&server);
    let task = TaskId::new(TASK);

    let result = client.download_task_result(&task, &downloads).await.unwrap();
    assert_eq!(result, downloads.join(format!("{TASK}-detailed-result.log")));
    assert_eq!(std::fs::read_to_string(&result).unwrap(), "detailed");

    let report = client
        .download_task_report(&task, TaskReportFormat::Junit, &downloads)
        .await
        .unwrap();
    assert_eq!(report, downloads.join(format!("{TASK}.junit")));

    let tempest = client
        .download_verification_report(
            &VerificationId::new(VERIFICATION),
            VerificationReportFormat::Json,
            &downloads,
        )
        .await
        .unwrap();
    assert_eq!(tempest, downloads.join(format!("tempest_{VERIFICATION}.json")));
}

#[tokio::test]
async fn verification_start_sends_null_optionals() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verifications"))
        .and(body_json(json!({
            "deployment_uuid": DEP,
            "set_name": "smoke",
            "regex": null,
            "tempest_config": null
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "uuid": VERIFICATION,
            "deployment_uuid": DEP,
            "set_name": "smoke",
            "status": "running"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = RunVerificationRequest {
        deployment_uuid: DeploymentId::new(DEP),
        set_name: "smoke".into(),
        regex: None,
        tempest_config: None,
    };
    let record = client(&server).start_verification(&request).await.unwrap();
    assert_eq!(record.uuid.as_str(), VERIFICATION);
}
