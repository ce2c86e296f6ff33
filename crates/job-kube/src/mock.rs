//! In-memory job client for tests: scripted status events, no cluster.

use crate::client::{JobClient, JobEventStream, JobStatus};
use crate::cron::CronSchedule;
use crate::spec::{CronJobSpec, JobSpec};
use async_trait::async_trait;
use futures::StreamExt;
use job_types::JobError;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    events: Vec<Result<JobStatus, JobError>>,
    status: Option<Result<JobStatus, JobError>>,
    pods: Vec<(String, String)>,
    watch_error: Option<JobError>,
    create_error: Option<JobError>,
    created: Vec<JobSpec>,
    cron_jobs: Vec<CronJobSpec>,
    log_requests: Vec<String>,
}

/// Job client whose status events and pods are scripted up front.
///
/// `watch` replays the scripted events once and then ends the stream; `get` returns the
/// scripted status, or the last scripted event when no status was set.
pub struct InMemoryJobClient {
    job_name: String,
    namespace: String,
    state: Mutex<State>,
}

impl InMemoryJobClient {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            namespace: "default".to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn with_events(self, events: Vec<Result<JobStatus, JobError>>) -> Self {
        self.state().events = events;
        self
    }

    pub fn with_status(self, status: JobStatus) -> Self {
        self.set_status(Ok(status));
        self
    }

    pub fn with_pod(self, name: impl Into<String>, logs: impl Into<String>) -> Self {
        self.state().pods.push((name.into(), logs.into()));
        self
    }

    pub fn fail_watch(self, err: JobError) -> Self {
        self.state().watch_error = Some(err);
        self
    }

    pub fn fail_create(self, err: JobError) -> Self {
        self.state().create_error = Some(err);
        self
    }

    pub fn set_status(&self, status: Result<JobStatus, JobError>) {
        self.state().status = Some(status);
    }

    pub fn created_jobs(&self) -> Vec<JobSpec> {
        self.state().created.clone()
    }

    pub fn cron_jobs(&self) -> Vec<CronJobSpec> {
        self.state().cron_jobs.clone()
    }

    pub fn log_requests(&self) -> Vec<String> {
        self.state().log_requests.clone()
    }
}

#[async_trait]
impl JobClient for InMemoryJobClient {
    fn job_name(&self) -> &str {
        &self.job_name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self) -> Result<JobStatus, JobError> {
        let state = self.state();
        match (&state.status, state.events.last()) {
            (Some(status), _) => status.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => Ok(JobStatus::default()),
        }
    }

    async fn watch(&self) -> Result<JobEventStream, JobError> {
        let state = self.state();
        if let Some(err) = &state.watch_error {
            return Err(err.clone());
        }
        Ok(futures::stream::iter(state.events.clone()).boxed())
    }

    async fn create(&self, spec: &JobSpec) -> Result<(), JobError> {
        let mut state = self.state();
        if let Some(err) = &state.create_error {
            return Err(err.clone());
        }
        state.created.push(spec.clone());
        Ok(())
    }

    async fn create_cron_job(&self, spec: &CronJobSpec) -> Result<(), JobError> {
        let mut state = self.state();
        if state.cron_jobs.iter().any(|c| c.name == spec.name) {
            return Err(JobError::submission("cron job already exists").with_detail("cron_job", &spec.name));
        }
        state.cron_jobs.push(spec.clone());
        Ok(())
    }

    async fn get_job_schedule(&self) -> Result<CronSchedule, JobError> {
        let name = crate::name::cron_job_name(&self.job_name);
        self.state()
            .cron_jobs
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.schedule.clone())
            .ok_or_else(|| JobError::internal("cron job not found").with_detail("cron_job", name))
    }

    async fn update_job_schedule(&self, schedule: &CronSchedule) -> Result<(), JobError> {
        let name = crate::name::cron_job_name(&self.job_name);
        let mut state = self.state();
        let cron = state
            .cron_jobs
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| JobError::internal("cron job not found").with_detail("cron_job", name.clone()))?;
        cron.schedule = schedule.clone();
        Ok(())
    }

    async fn pod_logs(&self, name_fragment: &str) -> Result<String, JobError> {
        let mut state = self.state();
        state.log_requests.push(name_fragment.to_string());
        state
            .pods
            .iter()
            .rev()
            .find(|(name, _)| name.contains(name_fragment))
            .map(|(_, logs)| logs.clone())
            .ok_or_else(|| JobError::internal(format!("pod not found: {}", name_fragment)))
    }
}
