mod client;

pub use client::{normalize_execution_type, ControllerClient};
