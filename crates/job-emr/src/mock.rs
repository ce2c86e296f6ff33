//! In-memory step client and log store for tests.

use crate::client::{ClusterDescription, StepClient, StepDescription, StepState};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use job_types::{JobError, LogStore, ObjectPath};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

/// Gzip `text` the way the cluster writes step logs.
pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writes into a Vec cannot fail.
    let _ = encoder.write_all(text.as_bytes());
    encoder.finish().unwrap_or_default()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Default)]
struct StepState_ {
    descriptions: Vec<StepDescription>,
    next_description: usize,
    describe_error: Option<JobError>,
    add_error: Option<JobError>,
    cancel_error: Option<JobError>,
    log_uri: Option<String>,
    added: Vec<(String, String, Vec<String>)>,
    described: Vec<(String, String)>,
    cancelled: Vec<(String, String)>,
}

/// Step client replaying scripted descriptions; the last one repeats forever.
#[derive(Default)]
pub struct InMemoryStepClient {
    state: Mutex<StepState_>,
}

impl InMemoryStepClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_states(self, states: &[StepState]) -> Self {
        self.with_descriptions(states.iter().copied().map(StepDescription::in_state).collect())
    }

    pub fn with_descriptions(self, descriptions: Vec<StepDescription>) -> Self {
        lock(&self.state).descriptions = descriptions;
        self
    }

    pub fn with_describe_error(self, err: JobError) -> Self {
        lock(&self.state).describe_error = Some(err);
        self
    }

    pub fn with_log_uri(self, uri: impl Into<String>) -> Self {
        lock(&self.state).log_uri = Some(uri.into());
        self
    }

    pub fn fail_add_step(self, err: JobError) -> Self {
        lock(&self.state).add_error = Some(err);
        self
    }

    pub fn fail_cancel(self, err: JobError) -> Self {
        lock(&self.state).cancel_error = Some(err);
        self
    }

    /// `(cluster_id, name, args)` of every submitted step.
    pub fn added_steps(&self) -> Vec<(String, String, Vec<String>)> {
        lock(&self.state).added.clone()
    }

    /// `(cluster_id, step_id)` of every describe call.
    pub fn described_steps(&self) -> Vec<(String, String)> {
        lock(&self.state).described.clone()
    }

    pub fn describe_calls(&self) -> usize {
        lock(&self.state).described.len()
    }

    pub fn cancelled_steps(&self) -> Vec<(String, String)> {
        lock(&self.state).cancelled.clone()
    }

    pub fn cancel_calls(&self) -> usize {
        lock(&self.state).cancelled.len()
    }
}

#[async_trait]
impl StepClient for InMemoryStepClient {
    async fn add_step(&self, cluster_id: &str, name: &str, args: &[String]) -> Result<String, JobError> {
        let mut state = lock(&self.state);
        if let Some(err) = &state.add_error {
            return Err(err.clone());
        }
        state.added.push((cluster_id.to_string(), name.to_string(), args.to_vec()));
        Ok(format!("s-{}", state.added.len()))
    }

    async fn describe_step(&self, cluster_id: &str, step_id: &str) -> Result<StepDescription, JobError> {
        let mut state = lock(&self.state);
        state.described.push((cluster_id.to_string(), step_id.to_string()));
        if let Some(err) = &state.describe_error {
            return Err(err.clone());
        }
        let idx = state.next_description.min(state.descriptions.len().saturating_sub(1));
        state.next_description += 1;
        Ok(state
            .descriptions
            .get(idx)
            .cloned()
            .unwrap_or_else(|| StepDescription::in_state(StepState::Pending)))
    }

    async fn cancel_step(&self, cluster_id: &str, step_id: &str) -> Result<(), JobError> {
        let mut state = lock(&self.state);
        state.cancelled.push((cluster_id.to_string(), step_id.to_string()));
        match &state.cancel_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn describe_cluster(&self, _cluster_id: &str) -> Result<ClusterDescription, JobError> {
        Ok(ClusterDescription {
            log_uri: lock(&self.state).log_uri.clone(),
        })
    }
}

#[derive(Default)]
struct Objects {
    /// uri -> (bytes, exists checks that still report "missing")
    objects: HashMap<String, (Vec<u8>, usize)>,
    exists_calls: usize,
}

/// Object store keyed by URI. Objects can be made to appear only after a number of checks.
#[derive(Default)]
pub struct InMemoryLogStore {
    inner: Mutex<Objects>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(self, uri: &str, data: Vec<u8>) -> Self {
        self.put_after(uri, data, 0)
    }

    /// Store `data`, but report it missing for the first `hidden_checks` existence checks.
    pub fn put_after(self, uri: &str, data: Vec<u8>, hidden_checks: usize) -> Self {
        lock(&self.inner)
            .objects
            .insert(uri.to_string(), (data, hidden_checks));
        self
    }

    pub fn exists_calls(&self) -> usize {
        lock(&self.inner).exists_calls
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn exists(&self, path: &ObjectPath) -> Result<bool, JobError> {
        let mut inner = lock(&self.inner);
        inner.exists_calls += 1;
        match inner.objects.get_mut(&path.to_uri()) {
            Some((_, hidden)) if *hidden > 0 => {
                *hidden -= 1;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    async fn read(&self, path: &ObjectPath) -> Result<Vec<u8>, JobError> {
        lock(&self.inner)
            .objects
            .get(&path.to_uri())
            .map(|(data, _)| data.clone())
            .ok_or_else(|| JobError::internal("object not found").with_detail("path", path.to_uri()))
    }
}
