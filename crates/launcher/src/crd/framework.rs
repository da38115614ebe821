use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// FrameworkController workload object.
///
/// Objects read back may come from other clients and lean on controller
/// defaults, so every field tolerates being absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Framework {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FrameworkSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FrameworkStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkList {
    #[serde(default)]
    pub items: Vec<Framework>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkSpec {
    #[serde(default = "default_execution_type")]
    pub execution_type: String,
    #[serde(default)]
    pub retry_policy: RetryPolicySpec,
    #[serde(default)]
    pub task_roles: Vec<TaskRoleSpec>,
}

impl Default for FrameworkSpec {
    fn default() -> Self {
        Self {
            execution_type: default_execution_type(),
            retry_policy: RetryPolicySpec::default(),
            task_roles: Vec::new(),
        }
    }
}

fn default_execution_type() -> String {
    "Start".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicySpec {
    pub fancy_retry_policy: bool,
    pub max_retry_count: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskRoleSpec {
    pub name: String,
    pub task_number: i32,
    pub framework_attempt_completion_policy: CompletionPolicySpec,
    pub task: TaskSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionPolicySpec {
    pub min_failed_task_count: i32,
    pub min_succeeded_task_count: i32,
}

impl Default for CompletionPolicySpec {
    /// Any failed task fails the role; success needs every task.
    fn default() -> Self {
        Self {
            min_failed_task_count: 1,
            min_succeeded_task_count: -1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSpec {
    pub retry_policy: RetryPolicySpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_graceful_deletion_timeout_sec: Option<i64>,
    pub pod: PodTemplateSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkStatus {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub retry_policy_status: RetryPolicyStatus,
    #[serde(default)]
    pub attempt_status: FrameworkAttemptStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyStatus {
    #[serde(default)]
    pub total_retried_count: i32,
    #[serde(default)]
    pub accountable_retried_count: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkAttemptStatus {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub completion_time: Option<String>,
    #[serde(rename = "instanceUID", default)]
    pub instance_uid: Option<String>,
    #[serde(default)]
    pub completion_status: Option<CompletionStatus>,
    #[serde(default)]
    pub task_role_statuses: Vec<TaskRoleStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub phrase: Option<String>,
    #[serde(default)]
    pub diagnostics: Option<String>,
    #[serde(rename = "type", default)]
    pub completion_type: Option<CompletionType>,
    #[serde(default)]
    pub trigger: Option<CompletionTrigger>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionType {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionTrigger {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub task_role_name: Option<String>,
    #[serde(default)]
    pub task_index: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRoleStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub task_statuses: Vec<TaskStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub retry_policy_status: RetryPolicyStatus,
    #[serde(default)]
    pub attempt_status: TaskAttemptStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAttemptStatus {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub pod_name: Option<String>,
    #[serde(rename = "podIP", default)]
    pub pod_ip: Option<String>,
    #[serde(rename = "podHostIP", default)]
    pub pod_host_ip: Option<String>,
    #[serde(default)]
    pub pod_node_name: Option<String>,
    #[serde(default)]
    pub completion_status: Option<CompletionStatus>,
}
