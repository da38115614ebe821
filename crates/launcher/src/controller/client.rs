use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{Config, ControllerConfig};
use crate::crd::{Framework, FrameworkList, CONFIG_ANNOTATION};
use crate::job::{name, JobConfiguration, JobIdentifier};
use crate::metrics;
use crate::status::{self, JobDetail, JobSummary};
use crate::workload::WorkloadBuilder;
use crate::{Error, Result};

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Issues one request per operation against the framework controller and
/// classifies the outcome. Nothing is retried or cached.
pub struct ControllerClient {
    client: Client,
    config: ControllerConfig,
    builder: WorkloadBuilder,
}

impl ControllerClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .default_headers(config.controller.request_headers()?)
            .build()?;

        Ok(Self {
            client,
            config: config.controller.clone(),
            builder: WorkloadBuilder::new(config),
        })
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> Result<Vec<JobSummary>> {
        let result = self.list_frameworks().await.map(|frameworks| {
            let mut jobs: Vec<JobSummary> = frameworks.iter().map(status::to_summary).collect();
            jobs.sort_by(|a, b| b.created_time.cmp(&a.created_time));
            jobs
        });
        record("list", &result);
        if let Ok(jobs) = &result {
            debug!("Listed {} jobs", jobs.len());
        }
        result
    }

    pub async fn get(&self, job: &str) -> Result<JobDetail> {
        let result = self.fetch(job).await.map(|fw| status::to_detail(&fw));
        record("get", &result);
        result
    }

    /// Submits a new job. `raw_config` is stored verbatim on the framework.
    pub async fn put(&self, job: &str, config: &JobConfiguration, raw_config: &str) -> Result<()> {
        let result = self.create(job, config, raw_config).await;
        record("put", &result);
        match &result {
            Ok(()) => info!("Submitted job {} as framework {}", job, name::encode(job)),
            Err(e) => warn!("Failed to submit job {}: {}", job, e),
        }
        result
    }

    /// Patches only `spec.executionType`, e.g. `STOP` becomes `Stop`.
    pub async fn execute(&self, job: &str, execution_type: &str) -> Result<()> {
        let execution_type = normalize_execution_type(execution_type);
        let result = self.patch_execution_type(job, &execution_type).await;
        record("execute", &result);
        if result.is_ok() {
            info!("Set execution type of job {} to {}", job, execution_type);
        }
        result
    }

    /// The configuration text stored at submission, parsed.
    pub async fn get_config(&self, job: &str) -> Result<serde_yaml::Value> {
        let result = self.fetch(job).await.and_then(|framework| {
            let raw = framework
                .metadata
                .annotations
                .as_ref()
                .and_then(|annotations| annotations.get(CONFIG_ANNOTATION))
                .ok_or_else(|| Error::ConfigNotFound(job.to_string()))?;
            Ok(serde_yaml::from_str(raw)?)
        });
        record("get_config", &result);
        result
    }

    /// SSH connection info is not tracked for controller-managed jobs.
    pub async fn ssh_info(&self, job: &str) -> Result<serde_json::Value> {
        Err(Error::SshUnavailable(job.to_string()))
    }

    async fn list_frameworks(&self) -> Result<Vec<Framework>> {
        let response = self.client.get(self.config.frameworks_url()).send().await?;
        let response = expect_status(response, StatusCode::OK, None).await?;
        let list: FrameworkList = read_json(response).await?;
        Ok(list.items)
    }

    async fn fetch(&self, job: &str) -> Result<Framework> {
        let response = self
            .client
            .get(self.config.framework_url(&name::encode(job)))
            .send()
            .await?;
        let response = expect_status(response, StatusCode::OK, Some(job)).await?;
        read_json(response).await
    }

    async fn create(&self, job: &str, config: &JobConfiguration, raw_config: &str) -> Result<()> {
        let id = JobIdentifier::parse(job)?;
        let framework = self
            .builder
            .build(&id, config.virtual_cluster(), config, raw_config)?;

        let response = self
            .client
            .post(self.config.frameworks_url())
            .json(&framework)
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED, None).await?;
        Ok(())
    }

    async fn patch_execution_type(&self, job: &str, execution_type: &str) -> Result<()> {
        let patch = json!({
            "spec": {
                "executionType": execution_type,
            }
        });
        let response = self
            .client
            .patch(self.config.framework_url(&name::encode(job)))
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&patch)?)
            .send()
            .await?;
        expect_status(response, StatusCode::OK, Some(job)).await?;
        Ok(())
    }
}

/// Capitalizes the first letter and lower-cases the rest.
pub fn normalize_execution_type(value: &str) -> String {
    let lower = value.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Maps anything but `expected` to a typed error. A 404 on a by-name lookup
/// becomes `NotFound` for the caller's job name.
async fn expect_status(response: Response, expected: StatusCode, job: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    if let (StatusCode::NOT_FOUND, Some(job)) = (status, job) {
        return Err(Error::NotFound(job.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Upstream {
        status: status.as_u16(),
        message: upstream_message(&body),
    })
}

/// Kubernetes `Status` bodies carry a `message`; anything else is passed as is.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn record<T>(operation: &str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(Error::NotFound(_)) | Err(Error::ConfigNotFound(_)) => "not_found",
        Err(Error::Upstream { .. }) => "upstream_error",
        Err(Error::Transport(_)) => "transport_error",
        Err(_) => "error",
    };
    metrics::record_request(operation, outcome);
}
