pub mod config;
pub mod controller;
pub mod crd;
pub mod job;
pub mod metrics;
pub mod server;
pub mod status;
pub mod users;
pub mod workload;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Job {0} is not found.")]
    NotFound(String),
    #[error("Config of job {0} is not found.")]
    ConfigNotFound(String),
    #[error("SSH info of job {0} is not available.")]
    SshUnavailable(String),
    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),
    #[error("Invalid job config: {0}")]
    InvalidConfig(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable error code exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NoJobError",
            Error::ConfigNotFound(_) => "NoJobConfigError",
            Error::SshUnavailable(_) => "NoJobSshInfoError",
            Error::Upstream { .. } => "UpstreamError",
            Error::InvalidConfig(_) => "InvalidJobConfigError",
            _ => "InternalError",
        }
    }

    /// True when the user store reported a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kubernetes(kube::Error::Api(resp)) if resp.code == 404)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
