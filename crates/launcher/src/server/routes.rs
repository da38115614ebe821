use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::AppState;
use crate::job::{JobConfiguration, JobIdentifier};
use crate::{metrics, Error};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) | Error::ConfigNotFound(_) | Error::SshUnavailable(_) => {
                StatusCode::NOT_FOUND
            }
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::Upstream { status, .. } => upstream_status(*status),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(json!({
                "code": self.code(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Upstream failures keep the controller's error status; anything else it
/// answered with is reported as a bad gateway.
fn upstream_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => StatusCode::BAD_GATEWAY,
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> String {
    metrics::gather_metrics()
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Response {
    match state.jobs.list().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.jobs.get(&name).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Accepts the raw YAML job configuration as the request body.
pub async fn put_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: String,
) -> Response {
    let id = match JobIdentifier::parse(&name) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let config = match JobConfiguration::from_yaml(&body) {
        Ok(config) => config,
        Err(e) => return e.into_response(),
    };

    let virtual_cluster = config.virtual_cluster().to_string();
    match state
        .users
        .check_user_virtual_cluster(&id.username, &virtual_cluster)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "code": "ForbiddenUserError",
                    "message": format!(
                        "User {} is not allowed to do operation in {}",
                        id.username, virtual_cluster
                    ),
                })),
            )
                .into_response()
        }
        Err(e) if e.is_not_found() => {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "code": "ForbiddenUserError",
                    "message": format!("User {} does not exist", id.username),
                })),
            )
                .into_response()
        }
        Err(e) => return e.into_response(),
    }

    match state.jobs.put(&name, &config, &body).await {
        Ok(()) => {
            info!("Accepted job {}", name);
            (
                StatusCode::CREATED,
                Json(json!({ "message": format!("update job {} successfully", id.job_name) })),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecutionTypeRequest {
    pub value: String,
}

pub async fn execute_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<ExecutionTypeRequest>,
) -> Response {
    match state.jobs.execute(&name, &request.value).await {
        Ok(()) => Json(json!({
            "message": format!("execute job {} successfully", name),
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_job_config(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.jobs.get_config(&name).await {
        Ok(config) => Json(config).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_job_ssh_info(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.jobs.ssh_info(&name).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status() {
        assert_eq!(upstream_status(409), StatusCode::CONFLICT);
        assert_eq!(upstream_status(503), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(upstream_status(200), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream_status(302), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream_status(1000), StatusCode::BAD_GATEWAY);
    }
}
