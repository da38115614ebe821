//! Compiles a job configuration into a FrameworkController workload.

pub mod env;

use k8s_openapi::api::core::v1::{
    Capabilities, Container, EmptyDirVolumeSource, HostPathVolumeSource, LocalObjectReference,
    PodSpec, PodTemplateSpec, ResourceRequirements, SecretVolumeSource, SecurityContext, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{Config, RuntimeConfig, SchedulerConfig};
use crate::crd::{
    CompletionPolicySpec, Framework, FrameworkSpec, RetryPolicySpec, TaskRoleSpec, TaskSpec,
    CONFIG_ANNOTATION, LABEL_JOB_NAME, LABEL_USER_NAME, LABEL_VIRTUAL_CLUSTER,
};
use crate::job::{name, CompletionConfig, JobConfiguration, JobIdentifier, TaskRoleConfig};
use crate::Result;
use self::env::TaskPorts;

/// Job retry count that turns off the controller's retry classifier.
pub const DISABLE_FANCY_RETRY: i32 = -2;

pub const GPU_RESOURCE: &str = "nvidia.com/gpu";
pub const HIVED_SCHEDULING_ENABLE: &str = "hivedscheduler.microsoft.com/pod-scheduling-enable";
pub const HIVED_POD_SPEC_ANNOTATION: &str = "hivedscheduler.microsoft.com/pod-scheduling-spec";

const FUSE_RESOURCE: &str = "github.com/fuse";
const POD_GRACEFUL_DELETION_TIMEOUT_SEC: i64 = 600;
const RUNTIME_MOUNT: &str = "/usr/local/pai";
const HOST_LOG_ROOT: &str = "/var/log/pai";
const JOB_SSH_SECRET: &str = "job-ssh-secret";

/// How GPUs are requested for a task role.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuSchedulingMode {
    /// Generic `nvidia.com/gpu` resource limit.
    Plain { gpu: u32 },
    /// Placement delegated to the hived scheduler.
    HivedExtension {
        scheduler_name: String,
        pod_spec: String,
    },
}

#[derive(Debug, Clone)]
pub struct WorkloadBuilder {
    api_version: String,
    controller_address: String,
    runtime: RuntimeConfig,
    scheduler: SchedulerConfig,
}

/// Per-role values threaded through pod construction.
struct RoleContext<'a> {
    username: &'a str,
    virtual_cluster: &'a str,
    framework_name: &'a str,
    role_name: String,
}

impl WorkloadBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            api_version: config.controller.api_version.clone(),
            controller_address: config.controller.base_uri.clone(),
            runtime: config.runtime.clone(),
            scheduler: config.scheduler.clone(),
        }
    }

    pub fn build(
        &self,
        id: &JobIdentifier,
        virtual_cluster: &str,
        config: &JobConfiguration,
        raw_config: &str,
    ) -> Result<Framework> {
        let framework_name = id.framework_name();

        let mut task_roles = Vec::with_capacity(config.task_roles.len());
        for (role, task_role) in &config.task_roles {
            let ctx = RoleContext {
                username: &id.username,
                virtual_cluster,
                framework_name: &framework_name,
                role_name: name::sanitize(role),
            };
            let mode = self.gpu_mode(task_role, virtual_cluster)?;
            let image = config.resolve_image(&task_role.docker_image);
            task_roles.push(self.task_role(&ctx, task_role, image, mode));
        }

        debug!(
            "Built framework {} for {} with {} task roles",
            framework_name,
            id,
            task_roles.len()
        );

        Ok(Framework {
            api_version: self.api_version.clone(),
            kind: "Framework".to_string(),
            metadata: ObjectMeta {
                name: Some(framework_name.clone()),
                labels: Some(BTreeMap::from([
                    (LABEL_USER_NAME.to_string(), id.username.clone()),
                    (LABEL_VIRTUAL_CLUSTER.to_string(), virtual_cluster.to_string()),
                    (LABEL_JOB_NAME.to_string(), framework_name.clone()),
                ])),
                annotations: Some(BTreeMap::from([(
                    CONFIG_ANNOTATION.to_string(),
                    raw_config.to_string(),
                )])),
                ..Default::default()
            },
            spec: FrameworkSpec {
                execution_type: "Start".to_string(),
                retry_policy: job_retry_policy(config.job_retry_count),
                task_roles,
            },
            status: None,
        })
    }

    fn gpu_mode(&self, task_role: &TaskRoleConfig, virtual_cluster: &str) -> Result<GpuSchedulingMode> {
        let gpu = task_role.resource_per_instance.gpu;
        if !self.scheduler.hived_enabled {
            return Ok(GpuSchedulingMode::Plain { gpu });
        }

        let pod_spec = match &task_role.hived_pod_spec {
            Some(spec) => serde_yaml::to_string(spec)?,
            None => serde_yaml::to_string(&serde_json::json!({
                "virtualCluster": virtual_cluster,
                "priority": 0,
                "gpuNumber": gpu,
            }))?,
        };
        Ok(GpuSchedulingMode::HivedExtension {
            scheduler_name: self.scheduler.scheduler_name.clone(),
            pod_spec,
        })
    }

    fn task_role(
        &self,
        ctx: &RoleContext<'_>,
        task_role: &TaskRoleConfig,
        image: &str,
        mode: GpuSchedulingMode,
    ) -> TaskRoleSpec {
        TaskRoleSpec {
            name: ctx.role_name.clone(),
            task_number: task_role.instances.unwrap_or(1),
            framework_attempt_completion_policy: completion_policy(task_role.completion.as_ref()),
            task: TaskSpec {
                retry_policy: RetryPolicySpec {
                    fancy_retry_policy: true,
                    max_retry_count: 0,
                },
                pod_graceful_deletion_timeout_sec: Some(POD_GRACEFUL_DELETION_TIMEOUT_SEC),
                pod: self.pod_template(ctx, task_role, image, mode),
            },
        }
    }

    fn pod_template(
        &self,
        ctx: &RoleContext<'_>,
        task_role: &TaskRoleConfig,
        image: &str,
        mode: GpuSchedulingMode,
    ) -> PodTemplateSpec {
        let ports = TaskPorts::random();
        let resources = &task_role.resource_per_instance;

        let mut limits = BTreeMap::from([
            ("cpu".to_string(), Quantity(resources.cpu.to_string())),
            ("memory".to_string(), Quantity(format!("{}Mi", resources.memory_mb))),
            (FUSE_RESOURCE.to_string(), Quantity("1".to_string())),
        ]);
        let mut annotations = BTreeMap::from([(
            "container.apparmor.security.beta.kubernetes.io/main".to_string(),
            "unconfined".to_string(),
        )]);
        let mut main_env = env::base_env(ctx.username, ports);
        let mut scheduler_name = None;

        match mode {
            GpuSchedulingMode::Plain { gpu } => {
                limits.insert(GPU_RESOURCE.to_string(), Quantity(gpu.to_string()));
            }
            GpuSchedulingMode::HivedExtension {
                scheduler_name: scheduler,
                pod_spec,
            } => {
                limits.insert(HIVED_SCHEDULING_ENABLE.to_string(), Quantity("1".to_string()));
                annotations.insert(HIVED_POD_SPEC_ANNOTATION.to_string(), pod_spec);
                main_env.push(env::from_annotation(
                    "NVIDIA_VISIBLE_DEVICES",
                    env::GPU_ISOLATION_ANNOTATION,
                ));
                scheduler_name = Some(scheduler);
            }
        }

        let mut init_env = vec![
            env::value("USER_CMD", task_role.entrypoint.clone()),
            env::value("KUBE_APISERVER_ADDRESS", self.controller_address.clone()),
            env::value("GANG_ALLOCATION", "true"),
        ];
        init_env.extend(env::base_env(ctx.username, ports));

        let init = Container {
            name: "init".to_string(),
            image: Some(self.runtime.image.clone()),
            image_pull_policy: Some("Always".to_string()),
            env: Some(init_env),
            volume_mounts: Some(runtime_mounts()),
            ..Default::default()
        };

        let mut main_mounts = vec![mount("dshm", "/dev/shm", false)];
        main_mounts.extend(runtime_mounts());
        let main = Container {
            name: "main".to_string(),
            image: Some(image.to_string()),
            command: Some(vec![format!("{}/runtime", RUNTIME_MOUNT)]),
            env: Some(main_env),
            resources: Some(ResourceRequirements {
                limits: Some(limits),
                ..Default::default()
            }),
            security_context: Some(SecurityContext {
                allow_privilege_escalation: Some(false),
                capabilities: Some(Capabilities {
                    add: Some(vec![
                        "SYS_ADMIN".to_string(),
                        "IPC_LOCK".to_string(),
                        "DAC_READ_SEARCH".to_string(),
                    ]),
                    drop: Some(vec!["MKNOD".to_string()]),
                }),
                ..Default::default()
            }),
            termination_message_path: Some("/tmp/pai-termination-log".to_string()),
            volume_mounts: Some(main_mounts),
            ..Default::default()
        };

        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(BTreeMap::from([
                    (LABEL_USER_NAME.to_string(), ctx.username.to_string()),
                    (LABEL_VIRTUAL_CLUSTER.to_string(), ctx.virtual_cluster.to_string()),
                    ("type".to_string(), "kube-launcher-task".to_string()),
                ])),
                annotations: Some(annotations),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                scheduler_name,
                restart_policy: Some("Never".to_string()),
                service_account_name: Some(self.runtime.service_account.clone()),
                host_network: Some(true),
                dns_policy: Some("ClusterFirstWithHostNet".to_string()),
                image_pull_secrets: Some(vec![LocalObjectReference {
                    name: Some(self.runtime.image_pull_secret.clone()),
                }]),
                init_containers: Some(vec![init]),
                containers: vec![main],
                volumes: Some(self.volumes(ctx)),
                ..Default::default()
            }),
        }
    }

    fn volumes(&self, ctx: &RoleContext<'_>) -> Vec<Volume> {
        vec![
            Volume {
                name: "dshm".to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: "pai-vol".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
            Volume {
                name: "host-log".to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: format!(
                        "{}/{}/{}/{}",
                        HOST_LOG_ROOT, ctx.username, ctx.framework_name, ctx.role_name
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: "job-ssh-secret-volume".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(JOB_SSH_SECRET.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]
    }
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn runtime_mounts() -> Vec<VolumeMount> {
    vec![
        mount("pai-vol", RUNTIME_MOUNT, false),
        mount("host-log", &format!("{}/logs", RUNTIME_MOUNT), false),
        mount("job-ssh-secret-volume", &format!("{}/ssh-secret", RUNTIME_MOUNT), true),
    ]
}

/// Caller thresholds where given, otherwise fail fast on the first failure.
pub fn completion_policy(completion: Option<&CompletionConfig>) -> CompletionPolicySpec {
    let default = CompletionPolicySpec::default();
    match completion {
        Some(c) => CompletionPolicySpec {
            min_failed_task_count: c
                .min_failed_instances
                .unwrap_or(default.min_failed_task_count),
            min_succeeded_task_count: c
                .min_succeeded_instances
                .unwrap_or(default.min_succeeded_task_count),
        },
        None => default,
    }
}

pub fn job_retry_policy(job_retry_count: i32) -> RetryPolicySpec {
    RetryPolicySpec {
        fancy_retry_policy: job_retry_count != DISABLE_FANCY_RETRY,
        max_retry_count: job_retry_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_config(raw: &str) -> JobConfiguration {
        JobConfiguration::from_yaml(raw).unwrap()
    }

    const THREE_WORKERS: &str = r#"
prerequisites:
  - name: image
    type: dockerimage
    uri: ubuntu:20.04
taskRoles:
  worker:
    instances: 3
    entrypoint: sleep 60
    dockerImage: image
    resourcePerInstance:
      cpu: 2
      memoryMB: 4096
      gpu: 1
"#;

    fn main_container(framework: &Framework) -> &Container {
        &framework.spec.task_roles[0].task.pod.spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn test_three_instances_with_default_completion() {
        let builder = WorkloadBuilder::new(&Config::default());
        let id = JobIdentifier::new("alice", "train");
        let framework = builder
            .build(&id, "default", &job_config(THREE_WORKERS), THREE_WORKERS)
            .unwrap();

        assert_eq!(framework.kind, "Framework");
        assert_eq!(framework.metadata.name.as_deref(), Some(id.framework_name().as_str()));
        assert_eq!(framework.spec.task_roles.len(), 1);
        let role = &framework.spec.task_roles[0];
        assert_eq!(role.name, "worker");
        assert_eq!(role.task_number, 3);
        assert_eq!(
            role.framework_attempt_completion_policy,
            CompletionPolicySpec {
                min_failed_task_count: 1,
                min_succeeded_task_count: -1,
            }
        );
        assert_eq!(
            role.task.retry_policy,
            RetryPolicySpec {
                fancy_retry_policy: true,
                max_retry_count: 0,
            }
        );
        assert_eq!(
            framework.metadata.annotations.as_ref().unwrap()[CONFIG_ANNOTATION],
            THREE_WORKERS
        );
    }

    #[test]
    fn test_plain_gpu_pod() {
        let builder = WorkloadBuilder::new(&Config::default());
        let framework = builder
            .build(
                &JobIdentifier::new("alice", "train"),
                "default",
                &job_config(THREE_WORKERS),
                THREE_WORKERS,
            )
            .unwrap();

        let pod = framework.spec.task_roles[0].task.pod.spec.as_ref().unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.host_network, Some(true));
        assert_eq!(pod.service_account_name.as_deref(), Some("runtime-account"));
        assert!(pod.scheduler_name.is_none());

        let init = &pod.init_containers.as_ref().unwrap()[0];
        let init_env = init.env.as_ref().unwrap();
        assert!(init_env
            .iter()
            .any(|e| e.name == "USER_CMD" && e.value.as_deref() == Some("sleep 60")));
        assert!(init_env.iter().any(|e| e.name == "FC_TASK_INDEX"));

        let main = main_container(&framework);
        assert_eq!(main.image.as_deref(), Some("ubuntu:20.04"));
        let limits = main.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits["cpu"], Quantity("2".to_string()));
        assert_eq!(limits["memory"], Quantity("4096Mi".to_string()));
        assert_eq!(limits[GPU_RESOURCE], Quantity("1".to_string()));
        assert!(!limits.contains_key(HIVED_SCHEDULING_ENABLE));

        let volumes = pod.volumes.as_ref().unwrap();
        let host_log = volumes.iter().find(|v| v.name == "host-log").unwrap();
        assert_eq!(
            host_log.host_path.as_ref().unwrap().path,
            format!("/var/log/pai/alice/{}/worker", framework.metadata.name.as_ref().unwrap())
        );
        let ssh = main
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .find(|m| m.name == "job-ssh-secret-volume")
            .unwrap();
        assert_eq!(ssh.read_only, Some(true));
    }

    #[test]
    fn test_hived_extension() {
        let mut config = Config::default();
        config.scheduler.hived_enabled = true;
        let builder = WorkloadBuilder::new(&config);
        let raw = r#"
taskRoles:
  worker:
    entrypoint: nvidia-smi
    dockerImage: ubuntu
    resourcePerInstance:
      gpu: 4
    hivedPodSpec:
      virtualCluster: vc1
      priority: 10
      gpuType: K80
      gpuNumber: 4
"#;
        let framework = builder
            .build(&JobIdentifier::new("bob", "gpu"), "vc1", &job_config(raw), raw)
            .unwrap();

        let template = &framework.spec.task_roles[0].task.pod;
        let pod = template.spec.as_ref().unwrap();
        assert_eq!(pod.scheduler_name.as_deref(), Some("hivedscheduler"));

        let main = &pod.containers[0];
        let limits = main.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert!(!limits.contains_key(GPU_RESOURCE));
        assert_eq!(limits[HIVED_SCHEDULING_ENABLE], Quantity("1".to_string()));

        let annotation = &template.metadata.as_ref().unwrap().annotations.as_ref().unwrap()
            [HIVED_POD_SPEC_ANNOTATION];
        let placement: serde_yaml::Value = serde_yaml::from_str(annotation).unwrap();
        assert_eq!(placement["gpuType"], serde_yaml::Value::from("K80"));

        let devices = main
            .env
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.name == "NVIDIA_VISIBLE_DEVICES")
            .unwrap();
        assert_eq!(
            devices.value_from.as_ref().unwrap().field_ref.as_ref().unwrap().field_path,
            format!("metadata.annotations['{}']", env::GPU_ISOLATION_ANNOTATION)
        );
    }

    #[test]
    fn test_explicit_completion_policy() {
        let policy = completion_policy(Some(&CompletionConfig {
            min_failed_instances: Some(3),
            min_succeeded_instances: Some(1),
        }));
        assert_eq!(policy.min_failed_task_count, 3);
        assert_eq!(policy.min_succeeded_task_count, 1);

        let partial = completion_policy(Some(&CompletionConfig {
            min_failed_instances: None,
            min_succeeded_instances: Some(2),
        }));
        assert_eq!(partial.min_failed_task_count, 1);
        assert_eq!(partial.min_succeeded_task_count, 2);
    }

    #[test]
    fn test_job_retry_sentinel() {
        assert!(!job_retry_policy(-2).fancy_retry_policy);
        assert_eq!(job_retry_policy(-2).max_retry_count, -2);
        for count in [-1, 0, 1, 5] {
            let policy = job_retry_policy(count);
            assert!(policy.fancy_retry_policy);
            assert_eq!(policy.max_retry_count, count);
        }
    }
}
