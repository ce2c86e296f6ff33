//! Runner/CompletionWatcher pair over the step executor.

use crate::client::StepState;
use crate::executor::{EmrExecutor, SparkJobOptions, StepHandle, StepWaiter};
use async_trait::async_trait;
use job_resume::ResumeOption;
use job_types::{CompletionWatcher, JobError, ResourceId, Runner};
use std::sync::Arc;
use std::time::Duration;

/// Submits one step per `run`. With a resume option the wait is detached and reported through
/// the option; an option that already carries a token reattaches instead of submitting.
pub struct EmrRunner {
    executor: Arc<EmrExecutor>,
    args: Vec<String>,
    opts: SparkJobOptions,
    resource: Option<ResourceId>,
    resume: Option<ResumeOption>,
}

impl EmrRunner {
    pub fn new(executor: Arc<EmrExecutor>, args: Vec<String>, opts: SparkJobOptions) -> Self {
        Self {
            executor,
            args,
            opts,
            resource: None,
            resume: None,
        }
    }

    pub fn with_resource(mut self, id: ResourceId) -> Self {
        self.resource = Some(id);
        self
    }

    pub fn with_resume_option(mut self, resume: ResumeOption) -> Self {
        self.resume = Some(resume);
        self
    }
}

#[async_trait]
impl Runner for EmrRunner {
    async fn run(&self) -> Result<Box<dyn CompletionWatcher>, JobError> {
        let step = match &self.resume {
            Some(resume) => self.executor.start_resumable(&self.args, &self.opts, resume).await?,
            None => self.executor.submit(&self.args, &self.opts.job_name).await?,
        };
        Ok(Box::new(EmrCompletionWatcher {
            waiter: self.executor.waiter(),
            step,
            max_wait: self.opts.max_job_duration,
            resume: self.resume.clone(),
        }))
    }

    fn resource(&self) -> Option<ResourceId> {
        self.resource.clone()
    }
}

pub struct EmrCompletionWatcher {
    waiter: Arc<StepWaiter>,
    step: StepHandle,
    max_wait: Duration,
    resume: Option<ResumeOption>,
}

impl EmrCompletionWatcher {
    pub fn step(&self) -> &StepHandle {
        &self.step
    }
}

#[async_trait]
impl CompletionWatcher for EmrCompletionWatcher {
    async fn complete(&self) -> bool {
        if self.resume.as_ref().is_some_and(ResumeOption::is_finished) {
            return true;
        }
        match self.waiter.describe(&self.step).await {
            Ok(desc) => desc.state.is_terminal(),
            Err(_) => false,
        }
    }

    async fn wait(&self) -> Result<(), JobError> {
        match &self.resume {
            Some(resume) => resume.wait().await,
            None => self.waiter.wait_for_step(&self.step, self.max_wait).await,
        }
    }

    async fn err(&self) -> Result<(), JobError> {
        if let Some(result) = self.resume.as_ref().and_then(ResumeOption::result) {
            return result;
        }
        let desc = self.waiter.describe(&self.step).await?;
        match desc.state {
            StepState::Failed | StepState::Cancelled | StepState::Interrupted => {
                let reason = desc.failure_message.unwrap_or_else(|| desc.state.to_string());
                Err(JobError::execution(format!("step failed: {}", reason))
                    .with_detail("cluster_id", &self.step.cluster_id)
                    .with_detail("step_id", &self.step.step_id))
            }
            _ => Ok(()),
        }
    }

    async fn summary(&self) -> String {
        match self.waiter.describe(&self.step).await {
            Ok(desc) => format!(
                "Step {} on cluster {} is {}",
                self.step.step_id, self.step.cluster_id, desc.state
            ),
            Err(_) => "Could not fetch step.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryStepClient;
    use job_types::{ErrorKind, JobConfig};

    fn runner(client: &Arc<InMemoryStepClient>) -> EmrRunner {
        let executor = Arc::new(EmrExecutor::new(client.clone(), "j-1", None, &JobConfig::default()));
        EmrRunner::new(
            executor,
            vec!["spark-submit".into()],
            SparkJobOptions {
                job_name: "job".into(),
                max_job_duration: Duration::from_secs(600),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn run_then_wait() {
        let client = Arc::new(InMemoryStepClient::new().with_states(&[
            StepState::Running,
            StepState::Running,
            StepState::Completed,
        ]));
        let watcher = runner(&client).run().await.unwrap();
        assert!(!watcher.complete().await);
        assert_eq!(watcher.summary().await, "Step s-1 on cluster j-1 is RUNNING");
        watcher.wait().await.unwrap();
        assert!(watcher.complete().await);
        watcher.err().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn err_reports_failed_step() {
        let client = Arc::new(InMemoryStepClient::new().with_states(&[StepState::Failed]));
        let watcher = runner(&client).run().await.unwrap();
        assert!(watcher.complete().await);
        let err = watcher.err().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.detail("step_id"), Some("s-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn resumable_runner_waits_on_option() {
        let client = Arc::new(InMemoryStepClient::new().with_states(&[StepState::Running, StepState::Completed]));
        let resume = ResumeOption::new();
        let watcher = runner(&client).with_resume_option(resume.clone()).run().await.unwrap();
        assert!(resume.is_resume_id_set());
        watcher.wait().await.unwrap();
        assert!(watcher.complete().await);
        watcher.err().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_cluster_reads_as_incomplete() {
        let client = Arc::new(InMemoryStepClient::new().with_describe_error(JobError::connection("emr", "timeout")));
        let watcher = runner(&client).run().await.unwrap();
        assert!(!watcher.complete().await);
        assert_eq!(watcher.summary().await, "Could not fetch step.");
    }
}
