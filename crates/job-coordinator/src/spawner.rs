//! Runs materialize and import jobs as container jobs.

use crate::runner_config::MaterializedRunnerConfig;
use async_trait::async_trait;
use job_kube::{job_name_for, validate_job_limits, JobClient, KubernetesRunner, KubernetesRunnerConfig, ResourceSpecs};
use job_types::{JobConfig, JobError, ProviderType, ResourceId, Runner, RunnerKind, RunnerSpawner};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Opens a job client bound to one job name.
#[async_trait]
pub trait JobClientFactory: Send + Sync {
    async fn job_client(&self, job_name: &str) -> Result<Arc<dyn JobClient>, JobError>;
}

/// Cluster-backed client factory.
#[cfg(feature = "kubernetes")]
pub struct KubeClientFactory {
    config: Arc<JobConfig>,
}

#[cfg(feature = "kubernetes")]
impl KubeClientFactory {
    pub fn new(config: Arc<JobConfig>) -> Self {
        Self { config }
    }
}

#[cfg(feature = "kubernetes")]
#[async_trait]
impl JobClientFactory for KubeClientFactory {
    async fn job_client(&self, job_name: &str) -> Result<Arc<dyn JobClient>, JobError> {
        let client = job_kube::KubeJobClient::try_new(job_name, &self.config).await?;
        Ok(Arc::new(client) as Arc<dyn JobClient>)
    }
}

/// Builds a [`KubernetesRunner`] per request. The worker image receives the runner kind and the
/// serialized runner config through its environment.
pub struct KubernetesSpawner {
    clients: Arc<dyn JobClientFactory>,
    config: Arc<JobConfig>,
    image: String,
    workers: i32,
    specs: ResourceSpecs,
}

impl KubernetesSpawner {
    pub fn new(clients: Arc<dyn JobClientFactory>, config: Arc<JobConfig>, image: impl Into<String>) -> Self {
        Self {
            clients,
            config,
            image: image.into(),
            workers: 1,
            specs: ResourceSpecs::default(),
        }
    }

    /// Parallel workers for copy-to-online jobs.
    pub fn with_workers(mut self, workers: i32) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_resource_specs(mut self, specs: ResourceSpecs) -> Self {
        self.specs = specs;
        self
    }

    fn runner_config(
        &self,
        kind: RunnerKind,
        materialize: &MaterializedRunnerConfig,
        raw: String,
        id: &ResourceId,
    ) -> KubernetesRunnerConfig {
        let copy_to_online = kind == RunnerKind::Materialize && materialize.online_type != ProviderType::None;
        let env_vars = BTreeMap::from([
            ("NAME".to_string(), kind.as_str().to_string()),
            ("CONFIG".to_string(), raw),
            ("RESOURCE_TYPE".to_string(), id.resource_type.to_string()),
            ("RESOURCE_NAME".to_string(), id.name.clone()),
            ("RESOURCE_VARIANT".to_string(), id.variant.clone()),
        ]);
        KubernetesRunnerConfig {
            job_prefix: None,
            env_vars,
            resource: Some(id.clone()),
            image: self.image.clone(),
            num_tasks: if copy_to_online { self.workers } else { 1 },
            specs: self.specs.clone(),
            indexed_completion: copy_to_online,
        }
    }
}

#[async_trait]
impl RunnerSpawner for KubernetesSpawner {
    async fn get_job_runner(
        &self,
        kind: RunnerKind,
        config: Vec<u8>,
        id: &ResourceId,
    ) -> Result<Box<dyn Runner>, JobError> {
        let materialize = MaterializedRunnerConfig::deserialize(&config)?;
        let raw = String::from_utf8(config)
            .map_err(|e| JobError::invalid_argument(format!("runner config is not UTF-8: {}", e)))?;
        let runner_config = self.runner_config(kind, &materialize, raw, id);
        // Bad limits fail before a client is opened.
        validate_job_limits(&runner_config.specs)?;
        let job_name = job_name_for(Some(id), None, &mut rand::rng());
        tracing::debug!(job_name = %job_name, kind = kind.as_str(), "spawning kubernetes runner");
        let client = self.clients.job_client(&job_name).await?;
        let runner = KubernetesRunner::with_client(runner_config, &self.config, client)?;
        Ok(Box::new(runner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_kube::{CompletionMode, InMemoryJobClient, JobStatus};
    use job_types::{ErrorKind, MaterializationOptions, OutputFormat, ValueType};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingFactory {
        clients: Mutex<Vec<Arc<InMemoryJobClient>>>,
    }

    impl RecordingFactory {
        fn last(&self) -> Arc<InMemoryJobClient> {
            self.clients.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl JobClientFactory for RecordingFactory {
        async fn job_client(&self, job_name: &str) -> Result<Arc<dyn JobClient>, JobError> {
            let client = Arc::new(InMemoryJobClient::new(job_name).with_events(vec![Ok(JobStatus {
                active: 0,
                succeeded: 1,
                failed: 0,
            })]));
            self.clients.lock().unwrap().push(client.clone());
            Ok(client as Arc<dyn JobClient>)
        }
    }

    fn config(online_type: ProviderType) -> Vec<u8> {
        MaterializedRunnerConfig {
            offline_type: ProviderType::SparkOffline,
            offline_config: b"{}".to_vec(),
            online_type,
            online_config: Vec::new(),
            resource_id: ResourceId::feature("f", "v1"),
            value_type: ValueType::Int,
            is_update: false,
            options: MaterializationOptions {
                output: OutputFormat::Parquet,
                should_include_headers: true,
                max_job_duration: Duration::from_secs(60),
                job_name: "featureform-materialization--f--v1".into(),
                schema: None,
            },
        }
        .serialize()
        .unwrap()
    }

    fn spawner(factory: &Arc<RecordingFactory>) -> KubernetesSpawner {
        KubernetesSpawner::new(factory.clone(), Arc::new(JobConfig::default()), "featureform/worker:latest")
            .with_workers(4)
    }

    #[tokio::test]
    async fn copy_to_online_runs_indexed_workers() {
        let factory = Arc::new(RecordingFactory::default());
        let id = ResourceId::feature("f", "v1");
        let runner = spawner(&factory)
            .get_job_runner(RunnerKind::Materialize, config(ProviderType::RedisOnline), &id)
            .await
            .unwrap();
        runner.run().await.unwrap().wait().await.unwrap();

        let jobs = factory.last().created_jobs();
        let job = &jobs[0];
        assert_eq!(job.completion_mode, CompletionMode::Indexed);
        assert_eq!(job.parallelism, 4);
        let env = &job.containers[0].env;
        assert!(env.iter().any(|e| e.name == "NAME" && e.value == "Materialize"));
        assert!(env.iter().any(|e| e.name == "CONFIG" && e.value.contains("featureform-materialization--f--v1")));
        assert!(factory.last().job_name().starts_with("feature-f-v1-"));
    }

    #[tokio::test]
    async fn offline_only_materialization_runs_one_worker() {
        let factory = Arc::new(RecordingFactory::default());
        let id = ResourceId::feature("f", "v1");
        spawner(&factory)
            .get_job_runner(RunnerKind::Materialize, config(ProviderType::None), &id)
            .await
            .unwrap()
            .run()
            .await
            .unwrap();
        let jobs = factory.last().created_jobs();
        let job = &jobs[0];
        assert_eq!(job.completion_mode, CompletionMode::NonIndexed);
        assert_eq!(job.completions, 1);
    }

    #[tokio::test]
    async fn bad_limits_fail_before_a_client_is_opened() {
        let factory = Arc::new(RecordingFactory::default());
        let spawner = spawner(&factory).with_resource_specs(ResourceSpecs {
            cpu_request: Some("lots".into()),
            ..ResourceSpecs::default()
        });
        let err = match spawner
            .get_job_runner(RunnerKind::S3ImportDynamoDb, config(ProviderType::DynamodbOnline), &ResourceId::feature("f", "v1"))
            .await
        {
            Ok(_) => panic!("expected invalid limits to be rejected"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.detail("cpu_request"), Some("lots"));
        assert!(factory.clients.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_config_is_rejected() {
        let factory = Arc::new(RecordingFactory::default());
        let result = spawner(&factory)
            .get_job_runner(RunnerKind::Materialize, b"nope".to_vec(), &ResourceId::feature("f", "v1"))
            .await;
        assert!(result.is_err());
    }
}
