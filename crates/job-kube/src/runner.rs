//! Container-job Runner, cron scheduling and completion watcher.

use crate::client::{JobClient, JobStatus};
use crate::cron::CronSchedule;
use crate::name::cron_job_name;
use crate::quantity::validate_job_limits;
use crate::spec::{new_job_spec, CronJobSpec, JobSpec, KubernetesRunnerConfig};
use async_trait::async_trait;
use futures::StreamExt;
use job_types::{CompletionWatcher, JobConfig, JobError, ResourceId, Runner};
use std::sync::Arc;

/// A runner whose job template can also be installed as a recurring job.
#[async_trait]
pub trait CronRunner: Runner {
    async fn schedule_job(&self, schedule: &CronSchedule) -> Result<(), JobError>;

    /// Schedule of the recurring job created by [`CronRunner::schedule_job`].
    async fn job_schedule(&self) -> Result<CronSchedule, JobError>;

    async fn update_job_schedule(&self, schedule: &CronSchedule) -> Result<(), JobError>;
}

pub struct KubernetesRunner {
    client: Arc<dyn JobClient>,
    spec: JobSpec,
    resource: Option<ResourceId>,
    cfg: JobConfig,
}

impl KubernetesRunner {
    /// Validate resource limits and build the job template. Nothing is submitted yet.
    pub fn with_client(
        config: KubernetesRunnerConfig,
        cfg: &JobConfig,
        client: Arc<dyn JobClient>,
    ) -> Result<Self, JobError> {
        let resources = validate_job_limits(&config.specs)?;
        let spec = new_job_spec(&config, resources, cfg);
        Ok(Self {
            client,
            spec,
            resource: config.resource,
            cfg: cfg.clone(),
        })
    }

    /// Derive the job name, connect to the cluster and build the runner.
    #[cfg(feature = "kubernetes")]
    pub async fn connect(config: KubernetesRunnerConfig, cfg: &JobConfig) -> Result<Self, JobError> {
        // Limits are checked before any cluster access.
        validate_job_limits(&config.specs)?;
        let job_name = crate::name::job_name_for(config.resource.as_ref(), config.job_prefix.as_deref(), &mut rand::rng());
        let client = crate::kube_client::KubeJobClient::try_new(job_name, cfg).await?;
        Self::with_client(config, cfg, Arc::new(client))
    }

    pub fn job_name(&self) -> &str {
        self.client.job_name()
    }

    pub fn job_spec(&self) -> &JobSpec {
        &self.spec
    }
}

#[async_trait]
impl Runner for KubernetesRunner {
    async fn run(&self) -> Result<Box<dyn CompletionWatcher>, JobError> {
        tracing::info!(
            job_name = self.client.job_name(),
            namespace = self.client.namespace(),
            "creating kubernetes job"
        );
        self.client.create(&self.spec).await?;
        Ok(Box::new(KubernetesCompletionWatcher::new(self.client.clone())))
    }

    fn resource(&self) -> Option<ResourceId> {
        self.resource.clone()
    }
}

#[async_trait]
impl CronRunner for KubernetesRunner {
    async fn schedule_job(&self, schedule: &CronSchedule) -> Result<(), JobError> {
        let cron = CronJobSpec::new(
            cron_job_name(self.client.job_name()),
            schedule.clone(),
            self.spec.clone(),
            &self.cfg,
        );
        tracing::info!(
            cron_job = %cron.name,
            schedule = %schedule,
            concurrency_policy = cron.concurrency_policy.as_str(),
            "creating kubernetes cron job"
        );
        self.client.create_cron_job(&cron).await
    }

    async fn job_schedule(&self) -> Result<CronSchedule, JobError> {
        self.client.get_job_schedule().await
    }

    async fn update_job_schedule(&self, schedule: &CronSchedule) -> Result<(), JobError> {
        tracing::info!(job_name = self.client.job_name(), schedule = %schedule, "updating job schedule");
        self.client.update_job_schedule(schedule).await
    }
}

/// Observes one created job through its client.
pub struct KubernetesCompletionWatcher {
    client: Arc<dyn JobClient>,
}

impl KubernetesCompletionWatcher {
    /// Watch the job `client` is bound to.
    pub fn new(client: Arc<dyn JobClient>) -> Self {
        Self { client }
    }

    /// Execution error for a failed job, with whatever pod logs can be fetched.
    async fn failure(&self) -> JobError {
        let job_name = self.client.job_name();
        let logs = match self.client.pod_logs(job_name).await {
            Ok(logs) => logs,
            Err(e) => format!("could not fetch pod logs: {}", e),
        };
        JobError::execution("job failed")
            .with_detail("job_name", job_name)
            .with_detail("job_logs", logs)
    }

    async fn settle(&self, status: JobStatus) -> Option<Result<(), JobError>> {
        if status.succeeded() {
            Some(Ok(()))
        } else if status.failed() {
            Some(Err(self.failure().await))
        } else {
            None
        }
    }
}

#[async_trait]
impl CompletionWatcher for KubernetesCompletionWatcher {
    async fn complete(&self) -> bool {
        match self.client.get().await {
            Ok(status) => status.is_terminal(),
            Err(e) => {
                tracing::debug!(job_name = self.client.job_name(), error = %e, "job status query failed");
                false
            }
        }
    }

    async fn wait(&self) -> Result<(), JobError> {
        let mut events = self.client.watch().await?;
        while let Some(event) = events.next().await {
            if let Some(result) = self.settle(event?).await {
                return result;
            }
        }
        // The stream can close before the final transition reaches us; look once more.
        let status = self.client.get().await.map_err(|e| {
            JobError::internal("job watch ended before completion")
                .with_detail("job_name", self.client.job_name())
                .with_detail("error", e.to_string())
        })?;
        match self.settle(status).await {
            Some(result) => result,
            None => Err(JobError::internal("job watch ended before completion")
                .with_detail("job_name", self.client.job_name())),
        }
    }

    async fn err(&self) -> Result<(), JobError> {
        let status = self.client.get().await?;
        if status.failed > 0 {
            return Err(JobError::execution("job failed").with_detail("job_name", self.client.job_name()));
        }
        Ok(())
    }

    async fn summary(&self) -> String {
        match self.client.get().await {
            Ok(s) => format!(
                "{} jobs succeeded. {} jobs active. {} jobs failed",
                s.succeeded, s.active, s.failed
            ),
            Err(_) => "Could not fetch job.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryJobClient;
    use crate::quantity::ResourceSpecs;
    use job_types::{ErrorKind, ResourceId};

    fn config() -> KubernetesRunnerConfig {
        KubernetesRunnerConfig {
            resource: Some(ResourceId::feature("f", "v1")),
            image: "featureform/worker".into(),
            num_tasks: 1,
            ..KubernetesRunnerConfig::default()
        }
    }

    fn status(active: i32, succeeded: i32, failed: i32) -> JobStatus {
        JobStatus { active, succeeded, failed }
    }

    fn runner(client: &Arc<InMemoryJobClient>) -> KubernetesRunner {
        KubernetesRunner::with_client(config(), &JobConfig::default(), client.clone()).unwrap()
    }

    #[tokio::test]
    async fn run_creates_job_and_wait_succeeds() {
        let client = Arc::new(
            InMemoryJobClient::new("feature-f-v1-abcdefghij")
                .with_events(vec![Ok(status(1, 0, 0)), Ok(status(0, 1, 0))]),
        );
        let watcher = runner(&client).run().await.unwrap();
        watcher.wait().await.unwrap();
        assert_eq!(client.created_jobs().len(), 1);
        assert!(client.log_requests().is_empty());
    }

    #[tokio::test]
    async fn failed_job_attaches_pod_logs() {
        let client = Arc::new(
            InMemoryJobClient::new("feature-f-v1-abcdefghij")
                .with_events(vec![Ok(status(1, 0, 0)), Ok(status(0, 0, 1))])
                .with_pod("feature-f-v1-abcdefghij-x7k2p", "Traceback: boom"),
        );
        let watcher = runner(&client).run().await.unwrap();
        let err = watcher.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.detail("job_name"), Some("feature-f-v1-abcdefghij"));
        assert_eq!(err.detail("job_logs"), Some("Traceback: boom"));
        assert_eq!(client.log_requests(), vec!["feature-f-v1-abcdefghij".to_string()]);
    }

    #[tokio::test]
    async fn failed_job_without_pod_still_reports_log_attempt() {
        let client = Arc::new(
            InMemoryJobClient::new("feature-f-v1-abcdefghij").with_events(vec![Ok(status(0, 0, 1))]),
        );
        let err = runner(&client).run().await.unwrap().wait().await.unwrap_err();
        let logs = err.detail("job_logs").unwrap();
        assert!(logs.contains("could not fetch pod logs"), "{}", logs);
        assert!(logs.contains("feature-f-v1-abcdefghij"), "{}", logs);
    }

    #[tokio::test]
    async fn watch_open_failure_is_returned_directly() {
        let client = Arc::new(
            InMemoryJobClient::new("j").fail_watch(JobError::connection("kubernetes", "refused")),
        );
        let err = runner(&client).run().await.unwrap().wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn stream_end_rereads_job_once() {
        let client = Arc::new(
            InMemoryJobClient::new("j")
                .with_events(vec![Ok(status(1, 0, 0))])
                .with_status(status(0, 1, 0)),
        );
        runner(&client).run().await.unwrap().wait().await.unwrap();

        let stuck = Arc::new(
            InMemoryJobClient::new("j")
                .with_events(vec![Ok(status(1, 0, 0))])
                .with_status(status(1, 0, 0)),
        );
        let err = runner(&stuck).run().await.unwrap().wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("job watch ended before completion"));
    }

    #[tokio::test]
    async fn complete_err_and_summary() {
        let client = Arc::new(InMemoryJobClient::new("j").with_status(status(2, 1, 0)));
        let watcher = KubernetesCompletionWatcher::new(client.clone());
        assert!(!watcher.complete().await);
        assert_eq!(watcher.summary().await, "1 jobs succeeded. 2 jobs active. 0 jobs failed");
        watcher.err().await.unwrap();

        client.set_status(Ok(status(0, 0, 1)));
        assert!(watcher.complete().await);
        let err = watcher.err().await.unwrap_err();
        assert_eq!(err.detail("job_name"), Some("j"));

        client.set_status(Err(JobError::internal("api down")));
        assert!(!watcher.complete().await);
        assert_eq!(watcher.summary().await, "Could not fetch job.");
        assert!(watcher.err().await.is_err());
    }

    #[tokio::test]
    async fn invalid_limits_fail_before_submission() {
        let client = Arc::new(InMemoryJobClient::new("j"));
        let mut cfg = config();
        cfg.specs = ResourceSpecs {
            cpu_limit: Some("two".into()),
            ..ResourceSpecs::default()
        };
        let err = KubernetesRunner::with_client(cfg, &JobConfig::default(), client.clone())
            .err()
            .unwrap();
        assert_eq!(err.detail("cpu_limit"), Some("two"));
        assert!(client.created_jobs().is_empty());
    }

    #[tokio::test]
    async fn schedule_read_and_update() {
        let client = Arc::new(InMemoryJobClient::new("feature-f-v1-abcdefghij"));
        let runner = runner(&client);
        runner.schedule_job(&CronSchedule::hourly(5).unwrap()).await.unwrap();

        let crons = client.cron_jobs();
        assert_eq!(crons.len(), 1);
        assert_eq!(crons[0].name, "cron-feature-f-v1-abcdefghij");
        assert_eq!(crons[0].successful_jobs_history_limit, 2);
        assert_eq!(crons[0].failed_jobs_history_limit, 1);
        assert_eq!(crons[0].job_template, *runner.job_spec());

        assert_eq!(runner.job_schedule().await.unwrap().as_str(), "5 * * * *");
        runner.update_job_schedule(&CronSchedule::daily(2, 0).unwrap()).await.unwrap();
        assert_eq!(runner.job_schedule().await.unwrap().as_str(), "0 2 * * *");
        assert_eq!(client.cron_jobs()[0].job_template, *runner.job_spec());
    }

    #[tokio::test]
    async fn resource_is_reported() {
        let client = Arc::new(InMemoryJobClient::new("j"));
        assert_eq!(runner(&client).resource(), Some(ResourceId::feature("f", "v1")));
        assert!(!runner(&client).is_update_job());
    }
}
