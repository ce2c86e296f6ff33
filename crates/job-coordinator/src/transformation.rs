//! Transformation task: runs a Spark job and survives coordinator restarts through resume tokens.

use job_emr::{SparkExecutor, SparkJobOptions};
use job_resume::{ResumeId, ResumeOption};
use job_types::{JobConfig, JobError, MetadataClient, NameVariant};
use std::sync::Arc;

pub fn transformation_job_name(target: &NameVariant) -> String {
    format!("featureform-transformation--{}--{}", target.name, target.variant)
}

pub struct TransformationTask {
    metadata: Arc<dyn MetadataClient>,
    executor: Arc<dyn SparkExecutor>,
    config: Arc<JobConfig>,
    task_id: String,
    run_id: String,
    target: NameVariant,
}

impl TransformationTask {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        executor: Arc<dyn SparkExecutor>,
        config: Arc<JobConfig>,
        task_id: impl Into<String>,
        run_id: impl Into<String>,
        target: NameVariant,
    ) -> Self {
        Self {
            metadata,
            executor,
            config,
            task_id: task_id.into(),
            run_id: run_id.into(),
            target,
        }
    }

    async fn log(&self, message: &str) -> Result<(), JobError> {
        self.metadata
            .add_run_log(&self.task_id, &self.run_id, message)
            .await
            .map_err(JobError::from)
    }

    /// Submit `args` (or reattach to the step a previous run recorded) and wait for it.
    pub async fn run(&self, args: Vec<String>) -> Result<(), JobError> {
        let opts = SparkJobOptions {
            job_name: transformation_job_name(&self.target),
            max_job_duration: self.config.max_job_duration()?,
        };
        self.log("Starting Transformation...").await?;

        if !self.executor.supports_resumable() {
            tracing::debug!(task_id = %self.task_id, "executor is not resumable, running synchronously");
            self.executor.run_spark_job(args, &opts, None).await?;
            return self.log("Transformation Complete...").await;
        }

        let persisted = self
            .metadata
            .get_resume_id(&self.task_id, &self.run_id)
            .await?;
        let resume = match &persisted {
            Some(raw) => {
                tracing::info!(task_id = %self.task_id, run_id = %self.run_id, "resuming transformation from recorded resume id");
                ResumeOption::with_resume_id(ResumeId::new(raw.clone()))
            }
            None => ResumeOption::new(),
        };

        self.executor.run_spark_job(args, &opts, Some(&resume)).await?;

        if persisted.is_none() {
            if let Some(id) = resume.resume_id() {
                self.metadata
                    .set_resume_id(&self.task_id, &self.run_id, id.as_str())
                    .await?;
            }
        }

        self.log("Waiting for transformation to complete...").await?;
        resume.wait().await?;
        self.log("Transformation Complete...").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMetadata;
    use job_emr::mock::InMemoryStepClient;
    use job_emr::{EmrExecutor, EmrResumeId, StepState};
    use job_types::ErrorKind;

    fn task(md: &Arc<InMemoryMetadata>, exec: Arc<EmrExecutor>) -> TransformationTask {
        TransformationTask::new(
            md.clone(),
            exec,
            Arc::new(JobConfig::default()),
            "task-1",
            "run-1",
            NameVariant::new("t", "v1"),
        )
    }

    fn executor(client: &Arc<InMemoryStepClient>) -> Arc<EmrExecutor> {
        Arc::new(EmrExecutor::new(client.clone(), "j-1", None, &JobConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_run_persists_resume_id() {
        let client = Arc::new(InMemoryStepClient::new().with_states(&[StepState::Running, StepState::Completed]));
        let md = Arc::new(InMemoryMetadata::new());
        task(&md, executor(&client)).run(vec!["spark-submit".into()]).await.unwrap();

        let raw = md.get_resume_id("task-1", "run-1").await.unwrap().unwrap();
        let token = EmrResumeId::unmarshal(&ResumeId::new(raw)).unwrap();
        assert_eq!(token, EmrResumeId::new("j-1", "s-1"));
        assert_eq!(client.added_steps()[0].1, "featureform-transformation--t--v1");
        assert_eq!(
            md.run_logs("task-1", "run-1").await,
            vec![
                "Starting Transformation...",
                "Waiting for transformation to complete...",
                "Transformation Complete...",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_reattaches_instead_of_resubmitting() {
        let client = Arc::new(InMemoryStepClient::new().with_states(&[StepState::Completed]));
        let md = Arc::new(InMemoryMetadata::new());
        let token = EmrResumeId::new("j-1", "s-41").marshal().unwrap();
        md.set_resume_id("task-1", "run-1", token.as_str()).await.unwrap();

        task(&md, executor(&client)).run(vec!["spark-submit".into()]).await.unwrap();
        assert!(client.added_steps().is_empty());
        assert_eq!(client.described_steps()[0], ("j-1".to_string(), "s-41".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn step_failure_is_returned() {
        let client = Arc::new(InMemoryStepClient::new().with_states(&[StepState::Failed]));
        let md = Arc::new(InMemoryMetadata::new());
        let err = task(&md, executor(&client)).run(vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(md.get_resume_id("task-1", "run-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bad_max_duration_fails_before_submission() {
        let client = Arc::new(InMemoryStepClient::new());
        let md = Arc::new(InMemoryMetadata::new());
        let config = JobConfig {
            max_job_duration: "forever".into(),
            ..JobConfig::default()
        };
        let task = TransformationTask::new(
            md.clone(),
            executor(&client),
            Arc::new(config),
            "task-1",
            "run-1",
            NameVariant::new("t", "v1"),
        );
        let err = task.run(vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(client.added_steps().is_empty());
    }
}
