//! Feature materialization task: picks direct copy, S3 import or a generic materialize job.

use crate::runner_config::{import_from_s3_enabled, MaterializedRunnerConfig};
use job_types::{
    FeatureVariant, FileStoreKind, JobConfig, JobError, MaterializationOptionType,
    MaterializationOptions, MetadataClient, NameVariant, OfflineStore, OnlineStore, OutputFormat,
    ProviderFactory, ProviderRecord, ProviderType, ResourceId, ResourceSchema, RunnerKind,
    RunnerSpawner, SourceStatus, SourceVariant, StoreError,
};
use std::sync::Arc;

/// Collaborators shared by every task run by one coordinator.
#[derive(Clone)]
pub struct TaskContext {
    pub metadata: Arc<dyn MetadataClient>,
    pub providers: Arc<dyn ProviderFactory>,
    pub spawner: Arc<dyn RunnerSpawner>,
    pub config: Arc<JobConfig>,
}

/// How a feature ended up being materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectCopy,
    S3Import,
    Materialize,
}

pub fn materialization_job_name(target: &NameVariant) -> String {
    format!("featureform-materialization--{}--{}", target.name, target.variant)
}

/// One materialization attempt for one feature variant.
pub struct FeatureTask {
    ctx: TaskContext,
    task_id: String,
    run_id: String,
    target: NameVariant,
    is_update: bool,
}

impl FeatureTask {
    pub fn new(
        ctx: TaskContext,
        task_id: impl Into<String>,
        run_id: impl Into<String>,
        target: NameVariant,
    ) -> Self {
        Self {
            ctx,
            task_id: task_id.into(),
            run_id: run_id.into(),
            target,
            is_update: false,
        }
    }

    /// Mark the run as a refresh of an already materialized feature.
    pub fn updating(mut self, is_update: bool) -> Self {
        self.is_update = is_update;
        self
    }

    async fn log(&self, message: &str) -> Result<(), JobError> {
        self.ctx
            .metadata
            .add_run_log(&self.task_id, &self.run_id, message)
            .await
            .map_err(JobError::from)
    }

    /// Run the task to completion. Any failure aborts the attempt and is returned as is.
    pub async fn run(&self) -> Result<Strategy, JobError> {
        tracing::info!(
            task_id = %self.task_id,
            run_id = %self.run_id,
            feature = %self.target,
            "running feature materialization job"
        );
        self.log("Fetching Feature details...").await?;
        let feature = self.ctx.metadata.get_feature_variant(&self.target).await?;
        tracing::debug!(feature = %self.target, source = %feature.source, provider = ?feature.provider, "feature variant");

        self.log("Waiting for dependencies to complete...").await?;
        let source = self.await_source(&feature.source).await?;

        self.log("Fetching Offline Store...").await?;
        let source_provider = self.ctx.metadata.get_provider(&source.provider).await?;
        let offline = self.ctx.providers.offline_store(&source_provider).await?;

        let result = self
            .materialize(&feature, &source, &source_provider, offline.as_ref())
            .await;
        if let Err(e) = offline.close().await {
            tracing::error!(task_id = %self.task_id, error = %e, "could not close offline store");
        }
        let strategy = result?;

        tracing::debug!(feature = %self.target, ?strategy, "materialization complete");
        self.log("Materialization Complete...").await?;
        Ok(strategy)
    }

    /// Poll the catalog until the upstream source is ready.
    async fn await_source(&self, id: &NameVariant) -> Result<SourceVariant, JobError> {
        loop {
            let source = self.ctx.metadata.get_source_variant(id).await?;
            match &source.status {
                SourceStatus::Ready => return Ok(source),
                SourceStatus::Failed(message) => {
                    return Err(JobError::execution(format!(
                        "source {} failed: {}",
                        id, message
                    ))
                    .with_detail("source", id.to_string()));
                }
                SourceStatus::Pending => {
                    tracing::debug!(source = %id, "waiting for source to become ready");
                    tokio::time::sleep(self.ctx.config.source_poll_interval).await;
                }
            }
        }
    }

    async fn materialize(
        &self,
        feature: &FeatureVariant,
        source: &SourceVariant,
        source_provider: &ProviderRecord,
        offline: &dyn OfflineStore,
    ) -> Result<Strategy, JobError> {
        let online_provider = match &feature.provider {
            Some(name) => Some(self.ctx.metadata.get_provider(name).await?),
            None => None,
        };

        let location = source.location.clone().ok_or_else(|| {
            JobError::invalid_argument("source has no location")
                .with_detail("source", format!("{}/{}", source.name, source.variant))
        })?;
        let id = ResourceId::feature(&self.target.name, &self.target.variant);
        let schema = ResourceSchema {
            entity: feature.columns.entity.clone(),
            value: feature.columns.value.clone(),
            ts: feature.columns.ts.clone(),
            source_table: location,
        };
        tracing::debug!(id = %id, source_table = %schema.source_table, "registering resource table");
        self.log("Registering Feature from dataset...").await?;
        offline.register_resource_from_source_table(&id, &schema).await?;

        let max_job_duration = self.ctx.config.max_job_duration()?;
        let job_name = materialization_job_name(&self.target);

        let (online_type, online_config) = match &online_provider {
            Some(p) => (p.provider_type, p.serialized_config.clone()),
            None => (ProviderType::None, Vec::new()),
        };
        let runner_config = MaterializedRunnerConfig {
            offline_type: source_provider.provider_type,
            offline_config: source_provider.serialized_config.clone(),
            online_type,
            online_config,
            resource_id: id.clone(),
            value_type: feature.value_type,
            is_update: self.is_update,
            options: MaterializationOptions {
                output: OutputFormat::Parquet,
                should_include_headers: true,
                max_job_duration,
                job_name: job_name.clone(),
                schema: Some(schema),
            },
        };

        let import_from_s3 = import_from_s3_enabled(online_provider.as_ref())?;

        let mut direct_copy_target: Option<Arc<dyn OnlineStore>> = None;
        if let Some(provider) = &online_provider {
            let online = self.ctx.providers.online_store(provider).await?;
            let capability = MaterializationOptionType::DirectCopy(online.provider_type());
            if offline.supports_materialization_option(capability).await? {
                direct_copy_target = Some(online);
            }
        }

        self.log("Starting Materialization...").await?;

        if let Some(online) = direct_copy_target {
            self.log("Materializing via direct copy...").await?;
            match online
                .create_table(&self.target.name, &self.target.variant, feature.value_type)
                .await
            {
                Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
            let opts = MaterializationOptions {
                output: OutputFormat::default(),
                should_include_headers: false,
                max_job_duration,
                job_name,
                schema: None,
            };
            let materialization = offline.create_materialization(&id, &opts, Some(online)).await?;
            tracing::info!(id = %id, materialization = %materialization, "materialized via direct copy");
            return Ok(Strategy::DirectCopy);
        }

        if import_from_s3 {
            if offline.file_store_kind() == Some(FileStoreKind::S3) {
                tracing::info!(id = %id, "materializing feature via S3 import");
                self.run_job(
                    RunnerKind::S3ImportDynamoDb,
                    &runner_config,
                    "Starting Materialization via S3 to Dynamo Import...",
                )
                .await?;
                return Ok(Strategy::S3Import);
            }
            tracing::warn!(
                id = %id,
                file_store = ?offline.file_store_kind(),
                "S3 import is enabled but the offline file store is not S3, falling back to a materialize job"
            );
        }

        tracing::info!(id = %id, "starting feature materialization");
        self.run_job(
            RunnerKind::Materialize,
            &runner_config,
            "Starting Materialization via Copy...",
        )
        .await?;
        Ok(Strategy::Materialize)
    }

    async fn run_job(
        &self,
        kind: RunnerKind,
        config: &MaterializedRunnerConfig,
        marker: &str,
    ) -> Result<(), JobError> {
        self.log(marker).await?;
        let serialized = config.serialize()?;
        let runner = self
            .ctx
            .spawner
            .get_job_runner(kind, serialized, &config.resource_id)
            .await?;
        let watcher = runner.run().await?;
        self.log("Waiting for Materialization to complete...").await?;
        watcher.wait().await
    }
}
