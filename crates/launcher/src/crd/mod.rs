pub mod framework;

pub use framework::{
    CompletionPolicySpec, CompletionStatus, Framework, FrameworkAttemptStatus, FrameworkList,
    FrameworkSpec, FrameworkStatus, RetryPolicySpec, RetryPolicyStatus, TaskAttemptStatus,
    TaskRoleSpec, TaskRoleStatus, TaskSpec, TaskStatus,
};

/// Annotation holding the verbatim job configuration text.
pub const CONFIG_ANNOTATION: &str = "config";

pub const LABEL_USER_NAME: &str = "userName";
pub const LABEL_VIRTUAL_CLUSTER: &str = "virtualCluster";
pub const LABEL_JOB_NAME: &str = "jobName";
