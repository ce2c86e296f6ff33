//! Container-job backend: job naming, cron schedules, job templates, runner and completion watcher.

mod client;
mod cron;
#[cfg(feature = "kubernetes")]
mod kube_client;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod name;
mod quantity;
mod runner;
mod spec;

pub use client::{JobClient, JobEventStream, JobStatus};
pub use cron::CronSchedule;
#[cfg(feature = "kubernetes")]
pub use kube_client::{current_namespace, KubeJobClient};
pub use name::{create_job_name, cron_job_name, job_name_for, random_job_name, MAX_JOB_NAME_LENGTH};
pub use quantity::{parse_quantity, validate_job_limits, ResourceRequirements, ResourceSpecs};
pub use runner::{CronRunner, KubernetesCompletionWatcher, KubernetesRunner};
pub use spec::{
    new_job_spec, CompletionMode, ContainerSpec, CronJobSpec, EnvVar, JobSpec,
    KubernetesRunnerConfig,
};

#[cfg(any(test, feature = "test-util"))]
pub use mock::InMemoryJobClient;
