//! Seam between the runner/watcher and the container-orchestration API.

use crate::cron::CronSchedule;
use crate::spec::{CronJobSpec, JobSpec};
use async_trait::async_trait;
use futures::stream::BoxStream;
use job_types::JobError;
use serde::{Deserialize, Serialize};

/// Unit counters of one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

impl JobStatus {
    pub fn succeeded(&self) -> bool {
        self.active == 0 && self.succeeded > 0
    }

    pub fn failed(&self) -> bool {
        self.active == 0 && self.failed > 0
    }

    /// Nothing active and at least one unit finished, either way.
    pub fn is_terminal(&self) -> bool {
        self.active == 0 && (self.succeeded > 0 || self.failed > 0)
    }
}

/// Status changes of one job, in observation order.
pub type JobEventStream = BoxStream<'static, Result<JobStatus, JobError>>;

/// Handle bound to one job name in one namespace.
#[async_trait]
pub trait JobClient: Send + Sync {
    fn job_name(&self) -> &str;

    fn namespace(&self) -> &str;

    async fn get(&self) -> Result<JobStatus, JobError>;

    /// Change events for this job only.
    async fn watch(&self) -> Result<JobEventStream, JobError>;

    async fn create(&self, spec: &JobSpec) -> Result<(), JobError>;

    async fn create_cron_job(&self, spec: &CronJobSpec) -> Result<(), JobError>;

    /// Schedule of the recurring job wrapping this one.
    async fn get_job_schedule(&self) -> Result<CronSchedule, JobError>;

    /// Replace the schedule of the existing recurring job, keeping everything else.
    async fn update_job_schedule(&self, schedule: &CronSchedule) -> Result<(), JobError>;

    /// Latest log output of the last pod whose name contains `name_fragment`.
    async fn pod_logs(&self, name_fragment: &str) -> Result<String, JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        let running = JobStatus { active: 1, succeeded: 1, failed: 0 };
        assert!(!running.is_terminal());
        let pending = JobStatus::default();
        assert!(!pending.is_terminal());
        let ok = JobStatus { active: 0, succeeded: 2, failed: 0 };
        assert!(ok.succeeded() && ok.is_terminal() && !ok.failed());
        let bad = JobStatus { active: 0, succeeded: 0, failed: 1 };
        assert!(bad.failed() && bad.is_terminal());
    }
}
