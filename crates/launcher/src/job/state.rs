use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-facing job (and task) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Waiting,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "WAITING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Succeeded => write!(f, "SUCCEEDED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Attempt lifecycle as reported by the controller, for frameworks and tasks
/// alike (task states carry a `Task` prefix which is ignored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    CreationPending,
    CreationRequested,
    Preparing,
    Running,
    DeletionPending,
    DeletionRequested,
    Deleting,
    AttemptCompleted,
    Completed,
    Unrecognized,
}

impl From<&str> for AttemptState {
    fn from(s: &str) -> Self {
        let s = s.strip_prefix("Task").unwrap_or(s);
        match s {
            "AttemptCreationPending" => AttemptState::CreationPending,
            "AttemptCreationRequested" => AttemptState::CreationRequested,
            "AttemptPreparing" => AttemptState::Preparing,
            "AttemptRunning" => AttemptState::Running,
            "AttemptDeletionPending" => AttemptState::DeletionPending,
            "AttemptDeletionRequested" => AttemptState::DeletionRequested,
            "AttemptDeleting" => AttemptState::Deleting,
            "AttemptCompleted" => AttemptState::AttemptCompleted,
            "Completed" => AttemptState::Completed,
            _ => AttemptState::Unrecognized,
        }
    }
}

impl AttemptState {
    pub fn to_job_state(self, exit_code: Option<i32>) -> JobState {
        match self {
            AttemptState::CreationPending
            | AttemptState::CreationRequested
            | AttemptState::Preparing
            | AttemptState::DeletionPending
            | AttemptState::DeletionRequested
            | AttemptState::Deleting
            | AttemptState::AttemptCompleted => JobState::Waiting,
            AttemptState::Running => JobState::Running,
            AttemptState::Completed => match exit_code {
                Some(0) => JobState::Succeeded,
                _ => JobState::Failed,
            },
            AttemptState::Unrecognized => JobState::Unknown,
        }
    }
}

pub fn map_state(state: &str, exit_code: Option<i32>) -> JobState {
    AttemptState::from(state).to_job_state(exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_table() {
        assert_eq!(map_state("Completed", Some(0)), JobState::Succeeded);
        assert_eq!(map_state("Completed", Some(1)), JobState::Failed);
        assert_eq!(map_state("Completed", Some(-210)), JobState::Failed);
        assert_eq!(map_state("Completed", None), JobState::Failed);
        assert_eq!(map_state("AttemptRunning", None), JobState::Running);
        assert_eq!(map_state("AttemptRunning", Some(3)), JobState::Running);
        assert_eq!(map_state("AttemptCreationPending", None), JobState::Waiting);
        assert_eq!(map_state("AttemptCompleted", Some(0)), JobState::Waiting);
        assert_eq!(map_state("AttemptDeleting", None), JobState::Waiting);
    }

    #[test]
    fn test_task_states() {
        assert_eq!(map_state("TaskAttemptRunning", None), JobState::Running);
        assert_eq!(map_state("TaskCompleted", Some(0)), JobState::Succeeded);
        assert_eq!(map_state("TaskAttemptPreparing", None), JobState::Waiting);
    }

    #[test]
    fn test_unrecognized_states() {
        for state in ["", "Completed ", "completed", "AttemptHibernating", "Task"] {
            assert_eq!(map_state(state, Some(0)), JobState::Unknown);
        }
    }

    #[test]
    fn test_serialize_uppercase() {
        assert_eq!(serde_json::to_string(&JobState::Succeeded).unwrap(), "\"SUCCEEDED\"");
        assert_eq!(JobState::Waiting.to_string(), "WAITING");
    }
}
