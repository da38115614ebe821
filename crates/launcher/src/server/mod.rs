mod routes;

use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{controller::ControllerClient, users::UserManager, Result};

pub struct AppState {
    pub jobs: ControllerClient,
    pub users: UserManager,
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(jobs: ControllerClient, users: UserManager) -> Self {
        Self {
            state: Arc::new(AppState { jobs, users }),
        }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/api/v2/jobs", get(routes::list_jobs))
            .route("/api/v2/jobs/{name}", get(routes::get_job).put(routes::put_job))
            .route("/api/v2/jobs/{name}/executionType", put(routes::execute_job))
            .route("/api/v2/jobs/{name}/config", get(routes::get_job_config))
            .route("/api/v2/jobs/{name}/ssh", get(routes::get_job_ssh_info))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state)
    }

    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}
