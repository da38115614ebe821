//! Environment injected into every task container.

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, ObjectFieldSelector};
use rand::Rng;

/// Port range for per-task service and SSH ports. Ports are drawn at random
/// without checking for collisions on the host.
pub const PORT_RANGE: std::ops::Range<u16> = 20000..40000;

/// Annotation the hived scheduler fills with the assigned GPU indices.
pub const GPU_ISOLATION_ANNOTATION: &str = "hivedscheduler.microsoft.com/pod-gpu-isolation";

/// Controller-populated pod annotations and their backward-compatible aliases.
const ANNOTATION_ENV: &[(&str, Option<&str>)] = &[
    ("FC_FRAMEWORK_NAMESPACE", None),
    ("FC_FRAMEWORK_NAME", Some("PAI_JOB_NAME")),
    ("FC_TASKROLE_NAME", Some("PAI_CURRENT_TASK_ROLE_NAME")),
    ("FC_TASK_INDEX", Some("PAI_CURRENT_TASK_ROLE_CURRENT_TASK_INDEX")),
    ("FC_CONFIGMAP_NAME", None),
    ("FC_POD_NAME", None),
    ("FC_FRAMEWORK_ATTEMPT_ID", None),
    ("FC_TASK_ATTEMPT_ID", None),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPorts {
    pub http: u16,
    pub ssh: u16,
}

impl TaskPorts {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let http = rng.gen_range(PORT_RANGE);
        let mut ssh = rng.gen_range(PORT_RANGE);
        while ssh == http {
            ssh = rng.gen_range(PORT_RANGE);
        }
        Self { http, ssh }
    }
}

pub fn value(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub fn from_annotation(name: &str, annotation: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: format!("metadata.annotations['{}']", annotation),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Runtime context shared by the init and main containers.
pub fn base_env(username: &str, ports: TaskPorts) -> Vec<EnvVar> {
    let mut env = Vec::new();
    for (annotation, alias) in ANNOTATION_ENV {
        env.push(from_annotation(annotation, annotation));
        if let Some(alias) = alias {
            env.push(from_annotation(alias, annotation));
        }
    }
    env.push(value("PAI_USER_NAME", username));
    env.push(value("PAI_CONTAINER_HOST_PORT", ports.http.to_string()));
    env.push(value("PAI_CONTAINER_SSH_PORT", ports.ssh.to_string()));
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ports_in_range() {
        for _ in 0..100 {
            let ports = TaskPorts::random();
            assert!(PORT_RANGE.contains(&ports.http));
            assert!(PORT_RANGE.contains(&ports.ssh));
            assert_ne!(ports.http, ports.ssh);
        }
    }

    #[test]
    fn test_aliases_read_the_same_annotation() {
        let env = base_env("alice", TaskPorts { http: 20001, ssh: 20002 });
        let path = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value_from.as_ref())
                .and_then(|v| v.field_ref.as_ref())
                .map(|f| f.field_path.clone())
                .unwrap()
        };
        assert_eq!(path("FC_TASK_INDEX"), path("PAI_CURRENT_TASK_ROLE_CURRENT_TASK_INDEX"));
        assert_eq!(path("FC_TASK_INDEX"), "metadata.annotations['FC_TASK_INDEX']");
        assert_eq!(path("PAI_JOB_NAME"), "metadata.annotations['FC_FRAMEWORK_NAME']");

        let port = env.iter().find(|e| e.name == "PAI_CONTAINER_SSH_PORT").unwrap();
        assert_eq!(port.value.as_deref(), Some("20002"));
    }
}
