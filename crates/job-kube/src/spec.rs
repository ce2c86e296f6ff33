//! Backend-neutral job and cron-job templates.

use crate::cron::CronSchedule;
use crate::quantity::{ResourceRequirements, ResourceSpecs};
use job_types::{ConcurrencyPolicy, JobConfig, PullPolicy, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the caller asks the container backend to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesRunnerConfig {
    #[serde(default)]
    pub job_prefix: Option<String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Resource the job works on; without one the job gets a random name.
    #[serde(default)]
    pub resource: Option<ResourceId>,
    pub image: String,
    pub num_tasks: i32,
    #[serde(default)]
    pub specs: ResourceSpecs,
    /// Workers coordinate through their completion index (copy-to-online jobs).
    #[serde(default)]
    pub indexed_completion: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionMode {
    Indexed,
    NonIndexed,
}

impl CompletionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionMode::Indexed => "Indexed",
            CompletionMode::NonIndexed => "NonIndexed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<EnvVar>,
    pub image_pull_policy: PullPolicy,
    pub resources: ResourceRequirements,
}

/// Job template. Pods never restart in place; retries are governed by `backoff_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub completions: i32,
    pub parallelism: i32,
    pub completion_mode: CompletionMode,
    pub backoff_limit: i32,
    pub ttl_seconds_after_finished: i32,
    pub image_pull_secrets: Vec<String>,
    pub service_account_name: String,
    pub containers: Vec<ContainerSpec>,
    pub restart_policy: String,
}

/// Recurring wrapper around a [`JobSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobSpec {
    pub name: String,
    pub schedule: CronSchedule,
    pub job_template: JobSpec,
    pub successful_jobs_history_limit: i32,
    pub failed_jobs_history_limit: i32,
    pub concurrency_policy: ConcurrencyPolicy,
}

impl CronJobSpec {
    pub fn new(name: impl Into<String>, schedule: CronSchedule, job: JobSpec, cfg: &JobConfig) -> Self {
        Self {
            name: name.into(),
            schedule,
            job_template: job,
            successful_jobs_history_limit: cfg.successful_jobs_history_limit,
            failed_jobs_history_limit: cfg.failed_jobs_history_limit,
            concurrency_policy: cfg.concurrency_policy,
        }
    }
}

pub fn new_job_spec(
    config: &KubernetesRunnerConfig,
    resources: ResourceRequirements,
    cfg: &JobConfig,
) -> JobSpec {
    let completion_mode = if config.indexed_completion {
        CompletionMode::Indexed
    } else {
        CompletionMode::NonIndexed
    };
    let env = config
        .env_vars
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    JobSpec {
        completions: config.num_tasks,
        parallelism: config.num_tasks,
        completion_mode,
        backoff_limit: cfg.backoff_limit,
        ttl_seconds_after_finished: cfg.ttl_seconds_after_finished,
        image_pull_secrets: vec![cfg.image_pull_secret.clone()],
        service_account_name: cfg.service_account.clone(),
        containers: vec![ContainerSpec {
            name: uuid::Uuid::new_v4().to_string(),
            image: config.image.clone(),
            env,
            image_pull_policy: cfg.pull_policy(),
            resources,
        }],
        restart_policy: "Never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_config() -> KubernetesRunnerConfig {
        KubernetesRunnerConfig {
            env_vars: BTreeMap::from([("Name".to_string(), "Copy to online".to_string())]),
            image: "featureform/worker:latest".into(),
            num_tasks: 4,
            indexed_completion: true,
            ..KubernetesRunnerConfig::default()
        }
    }

    #[test]
    fn job_spec_carries_config_defaults() {
        let spec = new_job_spec(&runner_config(), ResourceRequirements::default(), &JobConfig::default());
        assert_eq!(spec.completions, 4);
        assert_eq!(spec.parallelism, 4);
        assert_eq!(spec.completion_mode, CompletionMode::Indexed);
        assert_eq!(spec.backoff_limit, 0);
        assert_eq!(spec.ttl_seconds_after_finished, 60);
        assert_eq!(spec.image_pull_secrets, vec!["regcred".to_string()]);
        assert_eq!(spec.service_account_name, "ff-coordinator-sa");
        assert_eq!(spec.restart_policy, "Never");
        let container = &spec.containers[0];
        assert_eq!(container.image_pull_policy, PullPolicy::IfNotPresent);
        assert_eq!(container.env[0].name, "Name");
        assert!(uuid::Uuid::parse_str(&container.name).is_ok());
    }

    #[test]
    fn debug_always_pulls() {
        let cfg = JobConfig {
            debug: true,
            ..JobConfig::default()
        };
        let mut config = runner_config();
        config.indexed_completion = false;
        let spec = new_job_spec(&config, ResourceRequirements::default(), &cfg);
        assert_eq!(spec.containers[0].image_pull_policy, PullPolicy::Always);
        assert_eq!(spec.completion_mode, CompletionMode::NonIndexed);
    }

    #[test]
    fn containers_get_fresh_names() {
        let cfg = JobConfig::default();
        let a = new_job_spec(&runner_config(), ResourceRequirements::default(), &cfg);
        let b = new_job_spec(&runner_config(), ResourceRequirements::default(), &cfg);
        assert_ne!(a.containers[0].name, b.containers[0].name);
    }

    #[test]
    fn cron_job_takes_retention_from_config() {
        let cfg = JobConfig {
            successful_jobs_history_limit: 5,
            concurrency_policy: ConcurrencyPolicy::Forbid,
            ..JobConfig::default()
        };
        let job = new_job_spec(&runner_config(), ResourceRequirements::default(), &cfg);
        let cron = CronJobSpec::new("cron-x", CronSchedule::daily(1, 0).unwrap(), job, &cfg);
        assert_eq!(cron.successful_jobs_history_limit, 5);
        assert_eq!(cron.failed_jobs_history_limit, 1);
        assert_eq!(cron.concurrency_policy, ConcurrencyPolicy::Forbid);
    }
}
