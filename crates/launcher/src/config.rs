use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub controller: ControllerConfig,
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub users: UserStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

/// Where the FrameworkController API lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub base_uri: String,
    pub api_version: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl ControllerConfig {
    pub fn frameworks_url(&self) -> String {
        format!(
            "{}/apis/{}/namespaces/{}/frameworks",
            self.base_uri.trim_end_matches('/'),
            self.api_version,
            self.namespace
        )
    }

    pub fn framework_url(&self, name: &str) -> String {
        format!("{}/{}", self.frameworks_url(), name)
    }

    /// Headers sent with every controller request.
    pub fn request_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid LAUNCHER_TOKEN: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// Settings for the staging init container and pod identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub image: String,
    pub image_pull_secret: String,
    pub service_account: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub hived_enabled: bool,
    pub scheduler_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hived_enabled: false,
            scheduler_name: "hivedscheduler".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStoreConfig {
    pub namespace: String,
    pub admin_group: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Config::default();
        let config = Config {
            server: ServerConfig {
                addr: std::env::var("SERVER_ADDR").unwrap_or(defaults.server.addr),
            },
            controller: ControllerConfig {
                base_uri: std::env::var("LAUNCHER_URI").unwrap_or(defaults.controller.base_uri),
                api_version: std::env::var("LAUNCHER_API_VERSION")
                    .unwrap_or(defaults.controller.api_version),
                namespace: std::env::var("LAUNCHER_NAMESPACE")
                    .unwrap_or(defaults.controller.namespace),
                bearer_token: std::env::var("LAUNCHER_TOKEN").ok().filter(|t| !t.is_empty()),
            },
            runtime: RuntimeConfig {
                image: std::env::var("RUNTIME_IMAGE").unwrap_or(defaults.runtime.image),
                image_pull_secret: std::env::var("RUNTIME_IMAGE_PULL_SECRETS")
                    .unwrap_or(defaults.runtime.image_pull_secret),
                service_account: std::env::var("RUNTIME_SERVICE_ACCOUNT")
                    .unwrap_or(defaults.runtime.service_account),
            },
            scheduler: SchedulerConfig {
                hived_enabled: std::env::var("HIVED_ENABLED")
                    .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                    .unwrap_or(false),
                scheduler_name: std::env::var("HIVED_SCHEDULER_NAME")
                    .unwrap_or(defaults.scheduler.scheduler_name),
            },
            users: UserStoreConfig {
                namespace: std::env::var("USER_SECRET_NAMESPACE")
                    .unwrap_or(defaults.users.namespace),
                admin_group: std::env::var("ADMIN_GROUP").unwrap_or(defaults.users.admin_group),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.controller.base_uri).map_err(|e| {
            Error::Config(format!(
                "LAUNCHER_URI '{}' is not a valid URL: {}",
                self.controller.base_uri, e
            ))
        })?;

        if self.runtime.image.is_empty() {
            return Err(Error::Config("RUNTIME_IMAGE must not be empty".to_string()));
        }

        if self.scheduler.hived_enabled && self.scheduler.scheduler_name.is_empty() {
            return Err(Error::Config(
                "HIVED_SCHEDULER_NAME must be set when HIVED_ENABLED is true".to_string(),
            ));
        }

        if self.controller.bearer_token.is_none() {
            tracing::warn!("LAUNCHER_TOKEN is not set. Requests to the controller are unauthenticated.");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:9186".to_string(),
            },
            controller: ControllerConfig {
                base_uri: "http://localhost:8080".to_string(),
                api_version: "frameworkcontroller.microsoft.com/v1".to_string(),
                namespace: "default".to_string(),
                bearer_token: None,
            },
            runtime: RuntimeConfig {
                image: "openpai/kube-runtime".to_string(),
                image_pull_secret: "pai-secret".to_string(),
                service_account: "runtime-account".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            users: UserStoreConfig {
                namespace: "pai-user".to_string(),
                admin_group: "admingroup".to_string(),
            },
        }
    }
}
