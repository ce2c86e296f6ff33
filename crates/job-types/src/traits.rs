//! Runner/CompletionWatcher contract and the collaborator traits the orchestrator consumes.

use crate::{
    FeatureVariant, FileStoreKind, JobError, MaterializationOptionType, MaterializationOptions,
    MetadataError, NameVariant, ObjectPath, ProviderRecord, ProviderType, ResourceId,
    ResourceSchema, SourceVariant, StoreError, ValueType,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Observes a submitted unit of work until it reaches a terminal state.
#[async_trait]
pub trait CompletionWatcher: Send + Sync {
    /// Non-blocking snapshot: true once nothing is active any more, success or not.
    /// A failed status query reads as "not yet complete".
    async fn complete(&self) -> bool;

    /// Block until the work succeeds or fails. Failures carry remote diagnostics when available.
    async fn wait(&self) -> Result<(), JobError>;

    /// Non-blocking re-check of the last observed state.
    async fn err(&self) -> Result<(), JobError>;

    /// Human-readable status (active/succeeded/failed counts).
    async fn summary(&self) -> String;
}

/// Submits one unit of remote work.
///
/// Each call to `run` is a fresh submission; callers must not call it twice for one logical
/// unit unless resubmission is intended.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self) -> Result<Box<dyn CompletionWatcher>, JobError>;

    /// Resource this runner materializes, if it is bound to one.
    fn resource(&self) -> Option<ResourceId> {
        None
    }

    fn is_update_job(&self) -> bool {
        false
    }
}

/// Runner families the spawner knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerKind {
    Materialize,
    S3ImportDynamoDb,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Materialize => "Materialize",
            RunnerKind::S3ImportDynamoDb => "S3 Import to DynamoDB",
        }
    }
}

/// Builds a runner from a serialized runner config.
#[async_trait]
pub trait RunnerSpawner: Send + Sync {
    async fn get_job_runner(
        &self,
        kind: RunnerKind,
        config: Vec<u8>,
        id: &ResourceId,
    ) -> Result<Box<dyn Runner>, JobError>;
}

/// Offline store as seen by the orchestrator.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Backing file storage, for file-based stores.
    fn file_store_kind(&self) -> Option<FileStoreKind> {
        None
    }

    async fn register_resource_from_source_table(
        &self,
        id: &ResourceId,
        schema: &ResourceSchema,
    ) -> Result<(), StoreError>;

    /// Capability query; never inspects the concrete online store type.
    async fn supports_materialization_option(
        &self,
        opt: MaterializationOptionType,
    ) -> Result<bool, StoreError>;

    /// Materialize `id`; with `direct_copy_to` the rows go straight into that online store.
    async fn create_materialization(
        &self,
        id: &ResourceId,
        opts: &MaterializationOptions,
        direct_copy_to: Option<Arc<dyn OnlineStore>>,
    ) -> Result<String, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OnlineStore: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    async fn create_table(
        &self,
        feature: &str,
        variant: &str,
        value_type: ValueType,
    ) -> Result<(), StoreError>;
}

/// Opens stores from a provider's type and serialized config.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn offline_store(
        &self,
        provider: &ProviderRecord,
    ) -> Result<Arc<dyn OfflineStore>, JobError>;

    async fn online_store(&self, provider: &ProviderRecord)
        -> Result<Arc<dyn OnlineStore>, JobError>;
}

/// Catalog collaborator: resource lookup, provider lookup, append-only run log, resume tokens.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn get_feature_variant(&self, id: &NameVariant) -> Result<FeatureVariant, MetadataError>;

    async fn get_source_variant(&self, id: &NameVariant) -> Result<SourceVariant, MetadataError>;

    async fn get_provider(&self, name: &str) -> Result<ProviderRecord, MetadataError>;

    async fn add_run_log(
        &self,
        task_id: &str,
        run_id: &str,
        message: &str,
    ) -> Result<(), MetadataError>;

    /// Persisted resume token for a run, if one was recorded.
    async fn get_resume_id(&self, task_id: &str, run_id: &str)
        -> Result<Option<String>, MetadataError>;

    async fn set_resume_id(
        &self,
        task_id: &str,
        run_id: &str,
        resume_id: &str,
    ) -> Result<(), MetadataError>;
}

/// Object store used to fetch remote logs.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn exists(&self, path: &ObjectPath) -> Result<bool, JobError>;

    async fn read(&self, path: &ObjectPath) -> Result<Vec<u8>, JobError>;
}
