//! Managed-cluster step API as consumed by the executor.

use async_trait::async_trait;
use job_types::JobError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Cancelled,
    CancelPending,
    Interrupted,
    Failed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "PENDING",
            StepState::Running => "RUNNING",
            StepState::Completed => "COMPLETED",
            StepState::Cancelled => "CANCELLED",
            StepState::CancelPending => "CANCEL_PENDING",
            StepState::Interrupted => "INTERRUPTED",
            StepState::Failed => "FAILED",
        }
    }

    /// The step will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed | StepState::Cancelled | StepState::Interrupted | StepState::Failed
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescription {
    pub state: StepState,
    /// Inline failure reason reported by the cluster.
    pub failure_message: Option<String>,
    /// Log directory of a failed step (`s3://.../steps/<step>`).
    pub log_file: Option<String>,
}

impl StepDescription {
    pub fn in_state(state: StepState) -> Self {
        Self {
            state,
            failure_message: None,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterDescription {
    pub log_uri: Option<String>,
}

#[async_trait]
pub trait StepClient: Send + Sync {
    /// Submit one step and return its id.
    async fn add_step(&self, cluster_id: &str, name: &str, args: &[String]) -> Result<String, JobError>;

    async fn describe_step(&self, cluster_id: &str, step_id: &str) -> Result<StepDescription, JobError>;

    async fn cancel_step(&self, cluster_id: &str, step_id: &str) -> Result<(), JobError>;

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, JobError>;
}
