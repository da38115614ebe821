//! Client-facing views over raw framework objects.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crd::{
    CompletionStatus, Framework, FrameworkStatus, TaskStatus, LABEL_USER_NAME,
    LABEL_VIRTUAL_CLUSTER,
};
use crate::job::{map_state, name, JobState};

const UNKNOWN_LABEL: &str = "unknown";

/// Split of the controller's retry counter by who is accountable for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryDetail {
    pub user: i32,
    pub platform: i32,
    /// Not tracked by the controller, always zero.
    pub resource: i32,
}

impl RetryDetail {
    pub fn split(total: i32, accountable: i32) -> Self {
        Self {
            user: accountable,
            platform: total - accountable,
            resource: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub name: String,
    pub username: String,
    pub state: JobState,
    pub sub_state: String,
    pub execution_type: String,
    pub retries: i32,
    pub retry_details: RetryDetail,
    pub created_time: Option<i64>,
    pub completed_time: Option<i64>,
    pub app_exit_code: Option<i32>,
    pub virtual_cluster: String,
    pub total_gpu_number: u32,
    pub total_task_number: usize,
    pub total_task_role_number: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub name: String,
    pub job_status: JobStatusDetail,
    pub task_roles: BTreeMap<String, TaskRoleDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusDetail {
    pub username: String,
    pub state: JobState,
    pub sub_state: String,
    pub execution_type: String,
    pub retries: i32,
    pub retry_details: RetryDetail,
    pub created_time: Option<i64>,
    pub completed_time: Option<i64>,
    pub app_id: Option<String>,
    pub app_progress: u8,
    pub app_tracking_url: String,
    pub app_launched_time: Option<i64>,
    pub app_completed_time: Option<i64>,
    pub app_exit_code: Option<i32>,
    pub app_exit_spec: serde_json::Map<String, serde_json::Value>,
    pub app_exit_diagnostics: Option<String>,
    pub app_exit_messages: AppExitMessages,
    pub app_exit_trigger_message: Option<String>,
    pub app_exit_trigger_task_role_name: Option<String>,
    pub app_exit_trigger_task_index: Option<i32>,
    pub app_exit_type: Option<String>,
    pub virtual_cluster: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppExitMessages {
    pub container: Option<String>,
    pub runtime: Option<String>,
    pub launcher: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRoleDetail {
    pub task_role_status: TaskRoleInfo,
    pub task_statuses: Vec<TaskDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRoleInfo {
    pub name: String,
}

/// Ports and GPUs are not reported by the controller, so they stay empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub task_index: i32,
    pub task_state: JobState,
    pub container_id: Option<String>,
    pub container_ip: Option<String>,
    pub container_ports: BTreeMap<String, String>,
    pub container_gpus: u32,
    pub container_log: String,
    pub container_exit_code: Option<i32>,
}

/// Milliseconds since epoch, `None` when absent or unparsable.
fn to_millis(time: Option<&str>) -> Option<i64> {
    time.and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())
}

fn label(framework: &Framework, key: &str) -> String {
    framework
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

fn decoded_name(framework: &Framework) -> String {
    name::decode(framework.metadata.name.as_deref().unwrap_or_default())
}

fn exit_code(completion: Option<&CompletionStatus>) -> Option<i32> {
    completion.map(|c| c.code)
}

/// Attempt state of a framework without status is still being created.
fn framework_state(status: Option<&FrameworkStatus>) -> (JobState, String) {
    match status {
        Some(status) => {
            let sub_state = status.state.clone().unwrap_or_default();
            let code = exit_code(status.attempt_status.completion_status.as_ref());
            (map_state(&sub_state, code), sub_state)
        }
        None => (JobState::Waiting, String::new()),
    }
}

fn retries(status: Option<&FrameworkStatus>) -> (i32, RetryDetail) {
    let retry = status.map(|s| s.retry_policy_status.clone()).unwrap_or_default();
    (
        retry.total_retried_count,
        RetryDetail::split(retry.total_retried_count, retry.accountable_retried_count),
    )
}

pub fn to_summary(framework: &Framework) -> JobSummary {
    let status = framework.status.as_ref();
    let (state, sub_state) = framework_state(status);
    let (retries, retry_details) = retries(status);
    let task_roles = status
        .map(|s| s.attempt_status.task_role_statuses.as_slice())
        .unwrap_or_default();

    JobSummary {
        name: decoded_name(framework),
        username: label(framework, LABEL_USER_NAME),
        state,
        sub_state,
        execution_type: framework.spec.execution_type.to_uppercase(),
        retries,
        retry_details,
        created_time: to_millis(status.and_then(|s| s.start_time.as_deref())),
        completed_time: to_millis(status.and_then(|s| s.completion_time.as_deref())),
        app_exit_code: status.and_then(|s| exit_code(s.attempt_status.completion_status.as_ref())),
        virtual_cluster: label(framework, LABEL_VIRTUAL_CLUSTER),
        total_gpu_number: 0,
        total_task_number: task_roles.iter().map(|r| r.task_statuses.len()).sum(),
        total_task_role_number: task_roles.len(),
    }
}

pub fn to_detail(framework: &Framework) -> JobDetail {
    let status = framework.status.as_ref();
    let (state, sub_state) = framework_state(status);
    let (retries, retry_details) = retries(status);
    let completion = status.and_then(|s| s.attempt_status.completion_status.as_ref());
    let start_time = to_millis(status.and_then(|s| s.start_time.as_deref()));
    let completion_time = to_millis(status.and_then(|s| s.completion_time.as_deref()));

    let job_status = JobStatusDetail {
        username: label(framework, LABEL_USER_NAME),
        state,
        sub_state,
        execution_type: framework.spec.execution_type.to_uppercase(),
        retries,
        retry_details,
        created_time: start_time,
        completed_time: completion_time,
        app_id: status.and_then(|s| s.attempt_status.instance_uid.clone()),
        app_progress: u8::from(completion.is_some()),
        app_tracking_url: String::new(),
        app_launched_time: start_time,
        app_completed_time: completion_time,
        app_exit_code: exit_code(completion),
        app_exit_spec: serde_json::Map::new(),
        app_exit_diagnostics: completion.and_then(|c| c.diagnostics.clone()),
        app_exit_messages: AppExitMessages::default(),
        app_exit_trigger_message: completion
            .and_then(|c| c.trigger.as_ref())
            .and_then(|t| t.message.clone()),
        app_exit_trigger_task_role_name: None,
        app_exit_trigger_task_index: None,
        app_exit_type: completion
            .and_then(|c| c.completion_type.as_ref())
            .map(|t| t.name.clone()),
        virtual_cluster: label(framework, LABEL_VIRTUAL_CLUSTER),
    };

    let task_roles = status
        .map(|s| s.attempt_status.task_role_statuses.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|role| {
            (
                role.name.clone(),
                TaskRoleDetail {
                    task_role_status: TaskRoleInfo {
                        name: role.name.clone(),
                    },
                    task_statuses: role.task_statuses.iter().map(to_task_detail).collect(),
                },
            )
        })
        .collect();

    JobDetail {
        name: decoded_name(framework),
        job_status,
        task_roles,
    }
}

pub fn to_task_detail(task: &TaskStatus) -> TaskDetail {
    let code = exit_code(task.attempt_status.completion_status.as_ref());
    TaskDetail {
        task_index: task.index,
        task_state: map_state(task.state.as_deref().unwrap_or_default(), code),
        container_id: task.attempt_status.pod_name.clone(),
        container_ip: task.attempt_status.pod_host_ip.clone(),
        container_ports: BTreeMap::new(),
        container_gpus: 0,
        container_log: String::new(),
        container_exit_code: code,
    }
}
