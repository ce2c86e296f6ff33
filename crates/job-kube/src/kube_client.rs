//! Job client backed by the Kubernetes API.

use crate::client::{JobClient, JobEventStream, JobStatus};
use crate::cron::CronSchedule;
use crate::name::cron_job_name;
use crate::spec::{CronJobSpec, JobSpec};
use async_trait::async_trait;
use futures::StreamExt;
use job_types::{JobConfig, JobError};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client;
use serde_json::json;

const PROVIDER: &str = "kubernetes";
const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

fn api_error(message: &str, err: kube::Error) -> JobError {
    JobError::connection(PROVIDER, format!("{}: {}", message, err))
}

/// Namespace the coordinator itself runs in, falling back to the configured one outside a cluster.
pub fn current_namespace(cfg: &JobConfig) -> String {
    match std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE) {
        Ok(ns) if !ns.trim().is_empty() && cfg.namespace == "default" => ns.trim().to_string(),
        _ => cfg.namespace.clone(),
    }
}

fn status_of(job: &Job) -> JobStatus {
    job.status
        .as_ref()
        .map(|s| JobStatus {
            active: s.active.unwrap_or(0),
            succeeded: s.succeeded.unwrap_or(0),
            failed: s.failed.unwrap_or(0),
        })
        .unwrap_or_default()
}

fn job_spec_json(spec: &JobSpec) -> serde_json::Value {
    let containers: Vec<serde_json::Value> = spec
        .containers
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "image": c.image,
                "env": c.env.iter().map(|e| json!({"name": e.name, "value": e.value})).collect::<Vec<_>>(),
                "imagePullPolicy": c.image_pull_policy.as_str(),
                "resources": {
                    "requests": c.resources.requests,
                    "limits": c.resources.limits,
                },
            })
        })
        .collect();
    json!({
        "completions": spec.completions,
        "parallelism": spec.parallelism,
        "completionMode": spec.completion_mode.as_str(),
        "backoffLimit": spec.backoff_limit,
        "ttlSecondsAfterFinished": spec.ttl_seconds_after_finished,
        "template": {
            "spec": {
                "imagePullSecrets": spec.image_pull_secrets.iter().map(|s| json!({"name": s})).collect::<Vec<_>>(),
                "serviceAccountName": spec.service_account_name,
                "containers": containers,
                "restartPolicy": spec.restart_policy,
            }
        }
    })
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, JobError> {
    serde_json::from_value(value)
        .map_err(|e| JobError::internal(format!("could not build kubernetes object: {}", e)))
}

pub struct KubeJobClient {
    client: Client,
    job_name: String,
    namespace: String,
}

impl KubeJobClient {
    pub async fn try_new(job_name: impl Into<String>, cfg: &JobConfig) -> Result<Self, JobError> {
        let client = Client::try_default()
            .await
            .map_err(|e| api_error("could not create kubernetes client", e))?;
        Ok(Self {
            client,
            job_name: job_name.into(),
            namespace: current_namespace(cfg),
        })
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn cron_jobs(&self) -> Api<CronJob> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl JobClient for KubeJobClient {
    fn job_name(&self) -> &str {
        &self.job_name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self) -> Result<JobStatus, JobError> {
        let job = self
            .jobs()
            .get(&self.job_name)
            .await
            .map_err(|e| api_error("could not get job", e).with_detail("job_name", &self.job_name))?;
        Ok(status_of(&job))
    }

    async fn watch(&self) -> Result<JobEventStream, JobError> {
        // Fail early if the job cannot be read at all; the watcher itself retries silently.
        self.get().await?;
        let config = watcher::Config::default().fields(&format!("metadata.name={}", self.job_name));
        let job_name = self.job_name.clone();
        let stream = watcher::watcher(self.jobs(), config)
            .default_backoff()
            .filter_map(move |event| {
                let item = match event {
                    Ok(Event::Apply(job)) | Ok(Event::InitApply(job)) => Some(Ok(status_of(&job))),
                    Ok(Event::Delete(_)) => Some(Err(JobError::execution("job was deleted")
                        .with_detail("job_name", job_name.clone()))),
                    Ok(Event::Init) | Ok(Event::InitDone) => None,
                    Err(e) => {
                        tracing::warn!(job_name = %job_name, error = %e, "job watch interrupted, retrying");
                        None
                    }
                };
                futures::future::ready(item)
            });
        Ok(stream.boxed())
    }

    async fn create(&self, spec: &JobSpec) -> Result<(), JobError> {
        let job: Job = from_json(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {"name": self.job_name, "namespace": self.namespace},
            "spec": job_spec_json(spec),
        }))?;
        self.jobs()
            .create(&PostParams::default(), &job)
            .await
            .map_err(|e| {
                JobError::submission(format!("could not create job: {}", e))
                    .with_detail("job_name", &self.job_name)
            })?;
        Ok(())
    }

    async fn create_cron_job(&self, spec: &CronJobSpec) -> Result<(), JobError> {
        let cron: CronJob = from_json(json!({
            "apiVersion": "batch/v1",
            "kind": "CronJob",
            "metadata": {"name": spec.name, "namespace": self.namespace},
            "spec": {
                "schedule": spec.schedule.as_str(),
                "jobTemplate": {"spec": job_spec_json(&spec.job_template)},
                "successfulJobsHistoryLimit": spec.successful_jobs_history_limit,
                "failedJobsHistoryLimit": spec.failed_jobs_history_limit,
                "concurrencyPolicy": spec.concurrency_policy.as_str(),
            },
        }))?;
        self.cron_jobs()
            .create(&PostParams::default(), &cron)
            .await
            .map_err(|e| {
                JobError::submission(format!("could not create cron job: {}", e))
                    .with_detail("cron_job", &spec.name)
            })?;
        Ok(())
    }

    async fn get_job_schedule(&self) -> Result<CronSchedule, JobError> {
        let name = cron_job_name(&self.job_name);
        let cron = self
            .cron_jobs()
            .get(&name)
            .await
            .map_err(|e| api_error("could not get cron job", e).with_detail("cron_job", &name))?;
        let schedule = cron.spec.map(|s| s.schedule).unwrap_or_default();
        CronSchedule::parse(&schedule)
    }

    async fn update_job_schedule(&self, schedule: &CronSchedule) -> Result<(), JobError> {
        let name = cron_job_name(&self.job_name);
        let patch = json!({"spec": {"schedule": schedule.as_str()}});
        self.cron_jobs()
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| api_error("could not update cron job", e).with_detail("cron_job", &name))?;
        Ok(())
    }

    async fn pod_logs(&self, name_fragment: &str) -> Result<String, JobError> {
        let pods = self
            .pods()
            .list(&ListParams::default())
            .await
            .map_err(|e| api_error("could not get pod list", e))?;
        let pod_name = pods
            .items
            .iter()
            .filter_map(|p| p.metadata.name.as_deref())
            .filter(|name| name.contains(name_fragment))
            .last()
            .map(str::to_string)
            .ok_or_else(|| JobError::internal(format!("pod not found: {}", name_fragment)))?;
        self.pods()
            .logs(&pod_name, &LogParams::default())
            .await
            .map_err(|e| api_error("could not read pod logs", e).with_detail("pod", &pod_name))
    }
}
