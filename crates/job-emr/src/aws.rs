//! AWS-backed step client and S3 log store.

use crate::client::{ClusterDescription, StepClient, StepDescription, StepState};
use crate::executor::EmrExecutor;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_emr::types::{
    ActionOnFailure, CancelStepsRequestStatus, HadoopJarStepConfig, StepConfig,
    StepState as AwsStepState,
};
use job_types::{JobConfig, JobError, LogStore, ObjectPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const PROVIDER: &str = "emr";
const COMMAND_RUNNER_JAR: &str = "command-runner.jar";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Cluster to submit to and how to reach it. Without static credentials the default
/// provider chain is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmrConfig {
    pub cluster_id: String,
    pub region: String,
    #[serde(default)]
    pub credentials: Option<StaticCredentials>,
}

async fn load_sdk_config(cfg: &EmrConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(cfg.region.clone()));
    if let Some(creds) = &cfg.credentials {
        loader = loader.credentials_provider(aws_sdk_emr::config::Credentials::new(
            creds.access_key_id.clone(),
            creds.secret_access_key.clone(),
            None,
            None,
            "job-emr-static",
        ));
    }
    loader.load().await
}

fn sdk_error(context: &str, err: impl std::fmt::Display) -> JobError {
    JobError::connection(PROVIDER, format!("{}: {}", context, err))
}

fn map_state(state: &AwsStepState) -> StepState {
    match state {
        AwsStepState::Pending => StepState::Pending,
        AwsStepState::Running => StepState::Running,
        AwsStepState::Completed => StepState::Completed,
        AwsStepState::Cancelled => StepState::Cancelled,
        AwsStepState::CancelPending => StepState::CancelPending,
        AwsStepState::Interrupted => StepState::Interrupted,
        AwsStepState::Failed => StepState::Failed,
        other => {
            tracing::warn!(state = ?other, "unknown step state, treating as pending");
            StepState::Pending
        }
    }
}

pub struct AwsStepClient {
    client: aws_sdk_emr::Client,
}

impl AwsStepClient {
    pub fn new(client: aws_sdk_emr::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepClient for AwsStepClient {
    async fn add_step(&self, cluster_id: &str, name: &str, args: &[String]) -> Result<String, JobError> {
        let jar = HadoopJarStepConfig::builder()
            .jar(COMMAND_RUNNER_JAR)
            .set_args(Some(args.to_vec()))
            .build()
            .map_err(|e| JobError::internal(format!("invalid step definition: {}", e)))?;
        let step = StepConfig::builder()
            .name(name)
            .action_on_failure(ActionOnFailure::Continue)
            .hadoop_jar_step(jar)
            .build()
            .map_err(|e| JobError::internal(format!("invalid step definition: {}", e)))?;
        let out = self
            .client
            .add_job_flow_steps()
            .job_flow_id(cluster_id)
            .steps(step)
            .send()
            .await
            .map_err(|e| {
                JobError::submission(format!("could not add step: {}", e)).with_detail("cluster_id", cluster_id)
            })?;
        out.step_ids()
            .first()
            .cloned()
            .ok_or_else(|| JobError::submission("cluster returned no step id").with_detail("cluster_id", cluster_id))
    }

    async fn describe_step(&self, cluster_id: &str, step_id: &str) -> Result<StepDescription, JobError> {
        let out = self
            .client
            .describe_step()
            .cluster_id(cluster_id)
            .step_id(step_id)
            .send()
            .await
            .map_err(|e| sdk_error("could not describe step", e))?;
        let status = out
            .step()
            .and_then(|s| s.status())
            .ok_or_else(|| JobError::internal("step has no status").with_detail("step_id", step_id))?;
        let state = status
            .state()
            .map(map_state)
            .ok_or_else(|| JobError::internal("step has no state").with_detail("step_id", step_id))?;
        let failure = status.failure_details();
        Ok(StepDescription {
            state,
            failure_message: failure.and_then(|f| f.message()).map(str::to_string),
            log_file: failure.and_then(|f| f.log_file()).map(str::to_string),
        })
    }

    async fn cancel_step(&self, cluster_id: &str, step_id: &str) -> Result<(), JobError> {
        let out = self
            .client
            .cancel_steps()
            .cluster_id(cluster_id)
            .step_ids(step_id)
            .send()
            .await
            .map_err(|e| sdk_error("could not cancel step", e))?;
        for info in out.cancel_steps_info_list() {
            if info.status() == Some(&CancelStepsRequestStatus::Failed) {
                let reason = info.reason().unwrap_or("no reason given");
                return Err(JobError::cancellation_failed(reason.to_string()).with_detail("step_id", step_id));
            }
        }
        Ok(())
    }

    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterDescription, JobError> {
        let out = self
            .client
            .describe_cluster()
            .cluster_id(cluster_id)
            .send()
            .await
            .map_err(|e| sdk_error("could not describe cluster", e))?;
        Ok(ClusterDescription {
            log_uri: out.cluster().and_then(|c| c.log_uri()).map(str::to_string),
        })
    }
}

/// Reads step logs from S3.
pub struct S3LogStore {
    client: aws_sdk_s3::Client,
}

impl S3LogStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogStore for S3LogStore {
    async fn exists(&self, path: &ObjectPath) -> Result<bool, JobError> {
        match self
            .client
            .head_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(JobError::connection("s3", e.to_string()).with_detail("path", path.to_uri())),
        }
    }

    async fn read(&self, path: &ObjectPath) -> Result<Vec<u8>, JobError> {
        let response = self
            .client
            .get_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| JobError::connection("s3", e.to_string()).with_detail("path", path.to_uri()))?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| JobError::connection("s3", format!("failed to read object body: {}", e)))?
            .into_bytes()
            .to_vec();
        Ok(data)
    }
}

impl EmrExecutor {
    /// Build an executor against a live cluster. When the cluster reports a log URI, step logs
    /// are read from it to diagnose failures.
    pub async fn connect(cfg: &EmrConfig, job_cfg: &JobConfig) -> Result<Self, JobError> {
        if cfg.cluster_id.is_empty() {
            return Err(JobError::invalid_argument("EMR cluster id must be set"));
        }
        let sdk = load_sdk_config(cfg).await;
        let steps = AwsStepClient::new(aws_sdk_emr::Client::new(&sdk));
        let log_store: Option<Arc<dyn LogStore>> = match steps.describe_cluster(&cfg.cluster_id).await {
            Ok(ClusterDescription { log_uri: Some(uri) }) => {
                tracing::info!(cluster_id = %cfg.cluster_id, log_uri = %uri, "using cluster log location for diagnostics");
                Some(Arc::new(S3LogStore::new(aws_sdk_s3::Client::new(&sdk))))
            }
            Ok(ClusterDescription { log_uri: None }) => {
                tracing::info!(cluster_id = %cfg.cluster_id, "cluster has no log location; step diagnostics disabled");
                None
            }
            Err(e) => {
                tracing::info!(cluster_id = %cfg.cluster_id, error = %e, "could not describe cluster; step diagnostics disabled");
                None
            }
        };
        Ok(Self::new(Arc::new(steps), cfg.cluster_id.clone(), log_store, job_cfg))
    }
}
