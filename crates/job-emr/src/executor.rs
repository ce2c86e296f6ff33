//! Step submission, bounded waiting, cancellation and failure diagnosis.

use crate::client::{StepClient, StepDescription, StepState};
use crate::resume_id::EmrResumeId;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use job_resume::{ResumeOption, TaskSupervisor};
use job_types::{JobConfig, JobError, LogStore, ObjectPath};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

const EXECUTOR_TYPE: &str = "EMR";
const FIX_SUGGESTION: &str = "Check the cluster logs for more information";
const STEP_LOG_FILE: &str = "stdout.gz";
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-job options.
#[derive(Debug, Clone, PartialEq)]
pub struct SparkJobOptions {
    pub job_name: String,
    pub max_job_duration: Duration,
}

/// Runs a compiled Spark command on a cluster.
#[async_trait]
pub trait SparkExecutor: Send + Sync {
    /// Whether `run_spark_job` honors a [`ResumeOption`].
    fn supports_resumable(&self) -> bool;

    /// Without a resume option, submit and block until the step finishes. With one, submit or
    /// reattach, record the token and return; the option receives the terminal result later.
    async fn run_spark_job(
        &self,
        args: Vec<String>,
        opts: &SparkJobOptions,
        resume: Option<&ResumeOption>,
    ) -> Result<(), JobError>;
}

/// A step the executor is tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepHandle {
    pub cluster_id: String,
    pub step_id: String,
}

fn step_details(cluster_id: &str, step_id: &str, max_wait: Duration) -> [(&'static str, String); 4] {
    [
        ("executor_type", EXECUTOR_TYPE.to_string()),
        ("cluster_id", cluster_id.to_string()),
        ("step_id", step_id.to_string()),
        ("wait_duration", format!("{:?}", max_wait)),
    ]
}

/// Everything a background wait needs; shared with detached tasks.
pub(crate) struct StepWaiter {
    client: Arc<dyn StepClient>,
    log_store: Option<Arc<dyn LogStore>>,
    step_poll_interval: Duration,
    log_poll_interval: Duration,
}

impl StepWaiter {
    pub(crate) async fn describe(&self, step: &StepHandle) -> Result<StepDescription, JobError> {
        self.client.describe_step(&step.cluster_id, &step.step_id).await
    }

    async fn poll_until_done(&self, step: &StepHandle) -> Result<StepDescription, JobError> {
        loop {
            let desc = self.describe(step).await?;
            if desc.state.is_terminal() {
                return Ok(desc);
            }
            tracing::debug!(step_id = %step.step_id, state = %desc.state, "step still running");
            tokio::time::sleep(self.step_poll_interval).await;
        }
    }

    /// Wait at most `max_wait` for the step; past that, cancel it.
    pub(crate) async fn wait_for_step(&self, step: &StepHandle, max_wait: Duration) -> Result<(), JobError> {
        let details = step_details(&step.cluster_id, &step.step_id, max_wait);
        match tokio::time::timeout(max_wait, self.poll_until_done(step)).await {
            Err(_) => Err(self.cancel_step(step, max_wait).await),
            Ok(Ok(desc)) => match desc.state {
                StepState::Completed => Ok(()),
                StepState::Failed => Err(self.step_failure(step, desc, max_wait).await),
                state => Err(JobError::execution(format!("step ended in state {}", state))
                    .with_details(details)
                    .with_fix_suggestion(FIX_SUGGESTION)),
            },
            Ok(Err(e)) => {
                tracing::error!(cluster_id = %step.cluster_id, step_id = %step.step_id, error = %e, "failure waiting for step");
                Err(JobError::execution(format!("failure waiting for completion of cluster: {}", e))
                    .with_details(details)
                    .with_fix_suggestion(FIX_SUGGESTION))
            }
        }
    }

    /// Cancel a step that outlived its bound. Always yields an error: the timeout when the
    /// cancel went through, the cancel failure otherwise.
    async fn cancel_step(&self, step: &StepHandle, max_wait: Duration) -> JobError {
        let details = step_details(&step.cluster_id, &step.step_id, max_wait);
        match self.client.cancel_step(&step.cluster_id, &step.step_id).await {
            Ok(()) => {
                tracing::error!(cluster_id = %step.cluster_id, step_id = %step.step_id, wait_duration = ?max_wait, "step exceeded max wait duration and was cancelled");
                JobError::timeout("EMR step exceeded max wait duration and was cancelled").with_details(details)
            }
            Err(e) => {
                tracing::error!(cluster_id = %step.cluster_id, step_id = %step.step_id, error = %e, "could not cancel step");
                JobError::cancellation_failed(format!(
                    "could not cancel EMR step that exceeded max wait duration: {}",
                    e
                ))
                .with_details(details)
            }
        }
    }

    async fn step_failure(&self, step: &StepHandle, desc: StepDescription, max_wait: Duration) -> JobError {
        let details = step_details(&step.cluster_id, &step.step_id, max_wait);
        let failed = |message: String| {
            JobError::execution(format!("step failed: {}", message))
                .with_details(details.clone())
                .with_fix_suggestion(FIX_SUGGESTION)
        };
        if let Some(message) = desc.failure_message.filter(|m| !m.is_empty()) {
            tracing::info!(step_id = %step.step_id, error_message = %message, "step failed with error message");
            return failed(message);
        }
        let Some(log_file) = desc.log_file.filter(|l| !l.is_empty()) else {
            tracing::info!(step_id = %step.step_id, "step failed but no error message was found");
            return failed("no error message was reported".to_string());
        };
        let Some(store) = &self.log_store else {
            tracing::error!(step_id = %step.step_id, "log file store is not set");
            return JobError::internal(format!(
                "cannot get error message for EMR step '{}' because the log file store is not set",
                step.step_id
            ))
            .with_details(details.clone())
            .with_detail("log_file", log_file);
        };
        match self.read_log_file(store.as_ref(), &log_file, max_wait).await {
            Ok(message) => failed(message),
            Err(e) => {
                tracing::error!(step_id = %step.step_id, log_file = %log_file, error = %e, "unable to get log file error message");
                JobError::execution(format!("could not get error message from log file: {}", e))
                    .with_details(details.clone())
                    .with_detail("log_file", log_file)
                    .with_fix_suggestion(FIX_SUGGESTION)
            }
        }
    }

    async fn read_log_file(&self, store: &dyn LogStore, log_file: &str, max_wait: Duration) -> Result<String, JobError> {
        let path = ObjectPath::parse(log_file)?.join(STEP_LOG_FILE);
        let appeared = async {
            while !store.exists(&path).await? {
                tracing::debug!(path = %path, "log file does not exist yet");
                tokio::time::sleep(self.log_poll_interval).await;
            }
            Ok::<(), JobError>(())
        };
        match tokio::time::timeout(max_wait, appeared).await {
            Ok(found) => found?,
            Err(_) => {
                return Err(JobError::internal("timed out waiting for log file").with_detail("path", path.to_uri()))
            }
        }
        let compressed = store.read(&path).await?;
        gunzip(&compressed)
    }
}

/// Decompress a gzip'd step log into text.
pub fn gunzip(data: &[u8]) -> Result<String, JobError> {
    let mut out = String::new();
    GzDecoder::new(data)
        .read_to_string(&mut out)
        .map_err(|e| JobError::internal(format!("could not uncompress error message: {}", e)))?;
    Ok(out)
}

/// Step executor bound to one default cluster.
pub struct EmrExecutor {
    waiter: Arc<StepWaiter>,
    cluster_id: String,
    supervisor: TaskSupervisor,
}

impl EmrExecutor {
    /// `log_store` enables failure diagnosis from step logs; without it diagnosis reports that
    /// diagnostics are unavailable.
    pub fn new(
        client: Arc<dyn StepClient>,
        cluster_id: impl Into<String>,
        log_store: Option<Arc<dyn LogStore>>,
        cfg: &JobConfig,
    ) -> Self {
        Self {
            waiter: Arc::new(StepWaiter {
                client,
                log_store,
                step_poll_interval: cfg.step_poll_interval.max(MIN_POLL_INTERVAL),
                log_poll_interval: cfg.log_poll_interval.max(MIN_POLL_INTERVAL),
            }),
            cluster_id: cluster_id.into(),
            supervisor: TaskSupervisor::new(),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub(crate) fn waiter(&self) -> Arc<StepWaiter> {
        self.waiter.clone()
    }

    /// Background waits still running.
    pub fn in_flight(&self) -> usize {
        self.supervisor.in_flight()
    }

    pub async fn describe_step(&self, step: &StepHandle) -> Result<StepDescription, JobError> {
        self.waiter.describe(step).await
    }

    /// Add a step to the default cluster without waiting for it.
    pub async fn submit(&self, args: &[String], job_name: &str) -> Result<StepHandle, JobError> {
        tracing::info!(cluster_id = %self.cluster_id, job_name, "running spark job on EMR");
        let step_id = self
            .waiter
            .client
            .add_step(&self.cluster_id, job_name, args)
            .await
            .map_err(|e| {
                tracing::error!(cluster_id = %self.cluster_id, error = %e, "could not add step to cluster");
                e
            })?;
        Ok(StepHandle {
            cluster_id: self.cluster_id.clone(),
            step_id,
        })
    }

    /// Reattach to the step recorded in `resume`, or submit a new one.
    async fn submit_or_resume(
        &self,
        args: &[String],
        job_name: &str,
        resume: Option<&ResumeOption>,
    ) -> Result<StepHandle, JobError> {
        if let Some(id) = resume.and_then(ResumeOption::resume_id) {
            let parsed = EmrResumeId::unmarshal(id)?;
            if parsed.cluster_id != self.cluster_id {
                tracing::warn!(
                    cluster_id = %self.cluster_id,
                    resuming_on_cluster_id = %parsed.cluster_id,
                    "resuming a step on a different cluster"
                );
            }
            tracing::info!(cluster_id = %parsed.cluster_id, step_id = %parsed.step_id, "resuming step on EMR");
            return Ok(StepHandle {
                cluster_id: parsed.cluster_id,
                step_id: parsed.step_id,
            });
        }
        self.submit(args, job_name).await
    }

    /// Submit or reattach, record the token, and hand the wait to a supervised task that finishes
    /// `resume` whatever happens.
    pub async fn start_resumable(
        &self,
        args: &[String],
        opts: &SparkJobOptions,
        resume: &ResumeOption,
    ) -> Result<StepHandle, JobError> {
        let step = self.submit_or_resume(args, &opts.job_name, Some(resume)).await?;
        if !resume.is_resume_id_set() {
            let token = EmrResumeId::new(&step.cluster_id, &step.step_id).marshal()?;
            resume.set_resume_id(token)?;
        }
        let waiter = self.waiter.clone();
        let max_wait = opts.max_job_duration;
        let handle = step.clone();
        tracing::info!(step_id = %step.step_id, wait_duration = ?max_wait, "waiting for EMR job to complete");
        self.supervisor.spawn_finishing(
            format!("emr-step-{}", step.step_id),
            resume.clone(),
            async move { waiter.wait_for_step(&handle, max_wait).await },
        );
        Ok(step)
    }

    /// Block until `step` finishes; past `max_wait` the step is cancelled.
    pub async fn wait_for_step(&self, step: &StepHandle, max_wait: Duration) -> Result<(), JobError> {
        self.waiter.wait_for_step(step, max_wait).await
    }
}

#[async_trait]
impl SparkExecutor for EmrExecutor {
    fn supports_resumable(&self) -> bool {
        true
    }

    async fn run_spark_job(
        &self,
        args: Vec<String>,
        opts: &SparkJobOptions,
        resume: Option<&ResumeOption>,
    ) -> Result<(), JobError> {
        tracing::debug!(job_name = %opts.job_name, resume_opt_set = resume.is_some(), "running spark job");
        match resume {
            Some(resume) => self.start_resumable(&args, opts, resume).await.map(|_| ()),
            None => {
                let step = self.submit(&args, &opts.job_name).await?;
                tracing::info!(step_id = %step.step_id, wait_duration = ?opts.max_job_duration, "waiting for EMR job to complete");
                self.wait_for_step(&step, opts.max_job_duration).await
            }
        }
    }
}
