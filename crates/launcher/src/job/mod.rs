mod config;
pub mod name;
pub mod state;

pub use config::{
    CompletionConfig, Defaults, JobConfiguration, JobIdentifier, Prerequisite, ResourcePerInstance,
    TaskRoleConfig, SEPARATOR,
};
pub use state::{map_state, AttemptState, JobState};
