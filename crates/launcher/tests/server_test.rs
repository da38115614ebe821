use async_trait::async_trait;
use axum::http::StatusCode;
use framework_launcher::{
    config::Config,
    controller::ControllerClient,
    job::name,
    server::Server,
    users::{SecretStore, User, UserExtension, UserManager},
    Error, Result,
};
use k8s_openapi::api::core::v1::Secret;
use kube::error::ErrorResponse;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FRAMEWORKS: &str = "/apis/frameworkcontroller.microsoft.com/v1/namespaces/default/frameworks";

const JOB_CONFIG: &str = r#"
taskRoles:
  worker:
    entrypoint: echo hello
    dockerImage: ubuntu:20.04
defaults:
  virtualCluster: vc1
"#;

#[derive(Default)]
struct MemorySecretStore {
    secrets: Mutex<HashMap<String, Secret>>,
}

fn not_found(name: &str) -> Error {
    Error::Kubernetes(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("secrets \"{}\" not found", name),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn list(&self) -> Result<Vec<Secret>> {
        Ok(self.secrets.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, secret: &Secret) -> Result<Secret> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.secrets.lock().unwrap().insert(name, secret.clone());
        Ok(secret.clone())
    }

    async fn replace(&self, name: &str, secret: &Secret) -> Result<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), secret.clone());
        Ok(secret.clone())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.secrets
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }
}

async fn test_server(controller: &MockServer) -> axum_test::TestServer {
    let mut config = Config::default();
    config.controller.base_uri = controller.uri();

    let users = UserManager::new(Arc::new(MemorySecretStore::default()), "admingroup");
    users
        .create_user(&User {
            username: "alice".to_string(),
            password: "encrypted".to_string(),
            email: "alice@example.com".to_string(),
            grouplist: ["default".to_string()].into_iter().collect(),
            extension: UserExtension {
                virtual_cluster: ["vc1".to_string()].into_iter().collect(),
                ..Default::default()
            },
        })
        .await
        .expect("Failed to seed user");

    let jobs = ControllerClient::new(&config).expect("Failed to create controller client");
    let app = Server::new(jobs, users).build_router();
    axum_test::TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_health_and_metrics() {
    let controller = MockServer::start().await;
    let client = test_server(&controller).await;

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");

    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_submit_job() {
    let controller = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FRAMEWORKS))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&controller)
        .await;
    let client = test_server(&controller).await;

    let response = client.put("/api/v2/jobs/alice~hello").text(JOB_CONFIG).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_submit_to_foreign_virtual_cluster_is_forbidden() {
    let controller = MockServer::start().await;
    let client = test_server(&controller).await;

    let config = JOB_CONFIG.replace("vc1", "vc2");
    let response = client.put("/api/v2/jobs/alice~hello").text(config).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "ForbiddenUserError");

    let response = client.put("/api/v2/jobs/mallory~hello").text(JOB_CONFIG).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert!(controller.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_invalid_config() {
    let controller = MockServer::start().await;
    let client = test_server(&controller).await;

    let response = client
        .put("/api/v2/jobs/alice~hello")
        .text("taskRoles: {}")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "InvalidJobConfigError");

    let response = client
        .put("/api/v2/jobs/alice~hello")
        .text("taskRoles: [unterminated")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "InvalidJobConfigError");

    let response = client.put("/api/v2/jobs/alice~").text(JOB_CONFIG).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(controller.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_stored_config_is_a_server_error() {
    let controller = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", FRAMEWORKS, name::encode("alice~hello"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {
                "name": name::encode("alice~hello"),
                "annotations": {"config": "taskRoles: [unterminated"}
            }
        })))
        .mount(&controller)
        .await;
    let client = test_server(&controller).await;

    let response = client.get("/api/v2/jobs/alice~hello/config").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "InternalError");
}

#[tokio::test]
async fn test_unexpected_upstream_success_is_bad_gateway() {
    let controller = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(FRAMEWORKS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&controller)
        .await;
    let client = test_server(&controller).await;

    let response = client.put("/api/v2/jobs/alice~hello").text(JOB_CONFIG).await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "UpstreamError");
}

#[tokio::test]
async fn test_missing_job_maps_to_404() {
    let controller = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", FRAMEWORKS, name::encode("alice~missing"))))
        .respond_with(ResponseTemplate::new(404))
        .mount(&controller)
        .await;
    let client = test_server(&controller).await;

    let response = client.get("/api/v2/jobs/alice~missing").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "NoJobError");
    assert!(body["message"].as_str().unwrap().contains("alice~missing"));
}

#[tokio::test]
async fn test_execution_type_and_ssh() {
    let controller = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/{}", FRAMEWORKS, name::encode("alice~hello"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&controller)
        .await;
    let client = test_server(&controller).await;

    let response = client
        .put("/api/v2/jobs/alice~hello/executionType")
        .json(&json!({"value": "STOP"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = client.get("/api/v2/jobs/alice~hello/ssh").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "NoJobSshInfoError");
}
