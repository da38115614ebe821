use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::name;
use crate::{Error, Result};

/// Separates the username from the job name in a job identifier.
pub const SEPARATOR: char = '~';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentifier {
    pub username: String,
    pub job_name: String,
}

impl JobIdentifier {
    pub fn new(username: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            job_name: job_name.into(),
        }
    }

    /// Splits on the first separator; the rest belongs to the job name.
    pub fn parse(full_name: &str) -> Result<Self> {
        match full_name.split_once(SEPARATOR) {
            Some((username, job_name)) if !username.is_empty() && !job_name.is_empty() => {
                Ok(Self::new(username, job_name))
            }
            _ => Err(Error::InvalidConfig(format!(
                "job identifier '{}' must have the form <user>{}<job>",
                full_name, SEPARATOR
            ))),
        }
    }

    pub fn framework_name(&self) -> String {
        name::encode(&self.to_string())
    }
}

impl fmt::Display for JobIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.username, SEPARATOR, self.job_name)
    }
}

/// Job configuration as submitted by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub job_retry_count: i32,

    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,

    pub task_roles: BTreeMap<String, TaskRoleConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prerequisite {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_cluster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRoleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<i32>,

    pub entrypoint: String,

    /// Name of a `dockerimage` prerequisite, or an image URI.
    pub docker_image: String,

    #[serde(default)]
    pub resource_per_instance: ResourcePerInstance,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionConfig>,

    /// Placement request handed to the hived scheduler verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hived_pod_spec: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePerInstance {
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(rename = "memoryMB", default = "default_memory_mb")]
    pub memory_mb: u32,
    #[serde(default)]
    pub gpu: u32,
}

impl Default for ResourcePerInstance {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory_mb: default_memory_mb(),
            gpu: 0,
        }
    }
}

fn default_cpu() -> u32 {
    1
}

fn default_memory_mb() -> u32 {
    1024
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_failed_instances: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_succeeded_instances: Option<i32>,
}

impl JobConfiguration {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: JobConfiguration =
            serde_yaml::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn virtual_cluster(&self) -> &str {
        self.defaults
            .as_ref()
            .and_then(|d| d.virtual_cluster.as_deref())
            .unwrap_or("default")
    }

    /// Looks up a `dockerimage` prerequisite by name, falling back to
    /// treating the reference as an image URI.
    pub fn resolve_image<'a>(&'a self, reference: &'a str) -> &'a str {
        self.prerequisites
            .iter()
            .find(|p| p.kind == "dockerimage" && p.name == reference)
            .map(|p| p.uri.as_str())
            .unwrap_or(reference)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_roles.is_empty() {
            return Err(Error::InvalidConfig("at least one task role is required".to_string()));
        }

        let mut seen = HashSet::new();
        for (role, task_role) in &self.task_roles {
            let sanitized = name::sanitize(role);
            if sanitized.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "task role name '{}' has no alphanumeric characters",
                    role
                )));
            }
            if !seen.insert(sanitized.clone()) {
                return Err(Error::InvalidConfig(format!(
                    "task role name '{}' collides with another role as '{}'",
                    role, sanitized
                )));
            }
            if task_role.instances.is_some_and(|n| n < 1) {
                return Err(Error::InvalidConfig(format!(
                    "task role '{}' must have at least one instance",
                    role
                )));
            }
            if task_role.entrypoint.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "task role '{}' has an empty entrypoint",
                    role
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"
name: mnist
jobRetryCount: 2
prerequisites:
  - name: image
    type: dockerimage
    uri: openpai/standard:python_3.6-pytorch_1.2.0-gpu
taskRoles:
  worker:
    instances: 3
    entrypoint: python train.py
    dockerImage: image
    resourcePerInstance:
      cpu: 4
      memoryMB: 8192
      gpu: 1
defaults:
  virtualCluster: vc1
"#;

    #[test]
    fn test_parse_job_config() {
        let config = JobConfiguration::from_yaml(RAW).unwrap();
        assert_eq!(config.job_retry_count, 2);
        assert_eq!(config.virtual_cluster(), "vc1");
        let worker = &config.task_roles["worker"];
        assert_eq!(worker.instances, Some(3));
        assert_eq!(worker.resource_per_instance.memory_mb, 8192);
        assert!(worker.completion.is_none());
        assert_eq!(
            config.resolve_image(&worker.docker_image),
            "openpai/standard:python_3.6-pytorch_1.2.0-gpu"
        );
        assert_eq!(config.resolve_image("ubuntu:20.04"), "ubuntu:20.04");
    }

    #[test]
    fn test_validate_rejects_colliding_roles() {
        let raw = r#"
taskRoles:
  Worker:
    entrypoint: "true"
    dockerImage: ubuntu
  worker_:
    entrypoint: "true"
    dockerImage: ubuntu
"#;
        assert!(matches!(
            JobConfiguration::from_yaml(raw),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_instances() {
        let raw = r#"
taskRoles:
  worker:
    instances: 0
    entrypoint: "true"
    dockerImage: ubuntu
"#;
        assert!(matches!(
            JobConfiguration::from_yaml(raw),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_invalid_config() {
        assert!(matches!(
            JobConfiguration::from_yaml("taskRoles: [unterminated"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_job_identifier() {
        let id = JobIdentifier::parse("alice~job~v2").unwrap();
        assert_eq!(id.username, "alice");
        assert_eq!(id.job_name, "job~v2");
        assert_eq!(id.to_string(), "alice~job~v2");
        assert!(JobIdentifier::parse("nojob").is_err());
        assert!(JobIdentifier::parse("~job").is_err());
        assert!(matches!(
            JobIdentifier::parse("alice~"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
