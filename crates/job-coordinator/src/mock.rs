//! Recording stores, provider factory, runner and spawner for exercising the orchestrator.

use async_trait::async_trait;
use job_types::{
    CompletionWatcher, FileStoreKind, JobError, MaterializationOptionType, MaterializationOptions,
    OfflineStore, OnlineStore, ProviderFactory, ProviderRecord, ProviderType, ResourceId, ResourceSchema, Runner,
    RunnerKind, RunnerSpawner, StoreError, ValueType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A materialization recorded by [`InMemoryOfflineStore`].
#[derive(Debug, Clone)]
pub struct RecordedMaterialization {
    pub id: ResourceId,
    pub options: MaterializationOptions,
    /// Online store type rows were copied into directly, if any.
    pub direct_copy_to: Option<ProviderType>,
}

#[derive(Default)]
struct OfflineState {
    registered: Vec<(ResourceId, ResourceSchema)>,
    materializations: Vec<RecordedMaterialization>,
    register_error: Option<StoreError>,
    close_calls: usize,
}

/// Offline store that records what it is asked to do.
pub struct InMemoryOfflineStore {
    provider_type: ProviderType,
    file_store: Option<FileStoreKind>,
    direct_copy: Vec<ProviderType>,
    state: RwLock<OfflineState>,
}

impl InMemoryOfflineStore {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            file_store: None,
            direct_copy: Vec::new(),
            state: RwLock::new(OfflineState::default()),
        }
    }

    pub fn with_file_store(mut self, kind: FileStoreKind) -> Self {
        self.file_store = Some(kind);
        self
    }

    /// Report direct-copy support into online stores of `online`.
    pub fn with_direct_copy(mut self, online: ProviderType) -> Self {
        self.direct_copy.push(online);
        self
    }

    pub fn fail_register(mut self, err: StoreError) -> Self {
        self.state.get_mut().register_error = Some(err);
        self
    }

    pub async fn registered(&self) -> Vec<(ResourceId, ResourceSchema)> {
        self.state.read().await.registered.clone()
    }

    pub async fn materializations(&self) -> Vec<RecordedMaterialization> {
        self.state.read().await.materializations.clone()
    }

    pub async fn close_calls(&self) -> usize {
        self.state.read().await.close_calls
    }
}

#[async_trait]
impl OfflineStore for InMemoryOfflineStore {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn file_store_kind(&self) -> Option<FileStoreKind> {
        self.file_store
    }

    async fn register_resource_from_source_table(
        &self,
        id: &ResourceId,
        schema: &ResourceSchema,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(err) = &state.register_error {
            return Err(err.clone());
        }
        state.registered.push((id.clone(), schema.clone()));
        Ok(())
    }

    async fn supports_materialization_option(
        &self,
        opt: MaterializationOptionType,
    ) -> Result<bool, StoreError> {
        match opt {
            MaterializationOptionType::DirectCopy(online) => Ok(self.direct_copy.contains(&online)),
        }
    }

    async fn create_materialization(
        &self,
        id: &ResourceId,
        opts: &MaterializationOptions,
        direct_copy_to: Option<Arc<dyn OnlineStore>>,
    ) -> Result<String, StoreError> {
        let mut state = self.state.write().await;
        state.materializations.push(RecordedMaterialization {
            id: id.clone(),
            options: opts.clone(),
            direct_copy_to: direct_copy_to.map(|s| s.provider_type()),
        });
        Ok(format!("materialization__{}__{}", id.name, id.variant))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.state.write().await.close_calls += 1;
        Ok(())
    }
}

/// Online store keeping only its table list.
pub struct InMemoryOnlineStore {
    provider_type: ProviderType,
    tables: RwLock<Vec<(String, String, ValueType)>>,
    create_calls: AtomicUsize,
}

impl InMemoryOnlineStore {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            tables: RwLock::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_table(mut self, feature: &str, variant: &str, value_type: ValueType) -> Self {
        self.tables
            .get_mut()
            .push((feature.to_string(), variant.to_string(), value_type));
        self
    }

    pub async fn tables(&self) -> Vec<(String, String, ValueType)> {
        self.tables.read().await.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnlineStore for InMemoryOnlineStore {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    async fn create_table(&self, feature: &str, variant: &str, value_type: ValueType) -> Result<(), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write().await;
        if tables.iter().any(|(f, v, _)| f == feature && v == variant) {
            return Err(StoreError::AlreadyExists(format!("{}__{}", feature, variant)));
        }
        tables.push((feature.to_string(), variant.to_string(), value_type));
        Ok(())
    }
}

/// Hands out pre-built stores by provider name.
#[derive(Default)]
pub struct InMemoryProviderFactory {
    offline: HashMap<String, Arc<InMemoryOfflineStore>>,
    online: HashMap<String, Arc<InMemoryOnlineStore>>,
}

impl InMemoryProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offline(mut self, provider: &str, store: Arc<InMemoryOfflineStore>) -> Self {
        self.offline.insert(provider.to_string(), store);
        self
    }

    pub fn with_online(mut self, provider: &str, store: Arc<InMemoryOnlineStore>) -> Self {
        self.online.insert(provider.to_string(), store);
        self
    }
}

#[async_trait]
impl ProviderFactory for InMemoryProviderFactory {
    async fn offline_store(&self, provider: &ProviderRecord) -> Result<Arc<dyn OfflineStore>, JobError> {
        self.offline
            .get(&provider.name)
            .map(|s| s.clone() as Arc<dyn OfflineStore>)
            .ok_or_else(|| JobError::invalid_argument("no offline store registered").with_detail("provider", &provider.name))
    }

    async fn online_store(&self, provider: &ProviderRecord) -> Result<Arc<dyn OnlineStore>, JobError> {
        self.online
            .get(&provider.name)
            .map(|s| s.clone() as Arc<dyn OnlineStore>)
            .ok_or_else(|| JobError::invalid_argument("no online store registered").with_detail("provider", &provider.name))
    }
}

/// Runner whose job finishes immediately with a fixed outcome.
pub struct InMemoryRunner {
    outcome: Result<(), JobError>,
    resource: Option<ResourceId>,
    runs: Arc<AtomicUsize>,
}

impl InMemoryRunner {
    pub fn new(outcome: Result<(), JobError>) -> Self {
        Self {
            outcome,
            resource: None,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_resource(mut self, id: ResourceId) -> Self {
        self.resource = Some(id);
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runner for InMemoryRunner {
    async fn run(&self) -> Result<Box<dyn CompletionWatcher>, JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryWatcher {
            outcome: self.outcome.clone(),
        }))
    }

    fn resource(&self) -> Option<ResourceId> {
        self.resource.clone()
    }
}

pub struct InMemoryWatcher {
    outcome: Result<(), JobError>,
}

#[async_trait]
impl CompletionWatcher for InMemoryWatcher {
    async fn complete(&self) -> bool {
        true
    }

    async fn wait(&self) -> Result<(), JobError> {
        self.outcome.clone()
    }

    async fn err(&self) -> Result<(), JobError> {
        self.outcome.clone()
    }

    async fn summary(&self) -> String {
        match &self.outcome {
            Ok(()) => "1 jobs succeeded. 0 jobs active. 0 jobs failed".to_string(),
            Err(_) => "0 jobs succeeded. 0 jobs active. 1 jobs failed".to_string(),
        }
    }
}

/// A `get_job_runner` call seen by [`InMemorySpawner`].
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub kind: RunnerKind,
    pub config: Vec<u8>,
    pub resource: ResourceId,
}

/// Spawner handing out [`InMemoryRunner`]s and recording every request.
pub struct InMemorySpawner {
    outcome: Result<(), JobError>,
    spawn_error: Option<JobError>,
    requests: RwLock<Vec<SpawnRequest>>,
    runs: Arc<AtomicUsize>,
}

impl Default for InMemorySpawner {
    fn default() -> Self {
        Self {
            outcome: Ok(()),
            spawn_error: None,
            requests: RwLock::new(Vec::new()),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InMemorySpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs started by spawned runners end with `outcome`.
    pub fn with_outcome(mut self, outcome: Result<(), JobError>) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn fail_spawn(mut self, err: JobError) -> Self {
        self.spawn_error = Some(err);
        self
    }

    pub async fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.read().await.clone()
    }

    /// `run` calls across every runner handed out.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunnerSpawner for InMemorySpawner {
    async fn get_job_runner(
        &self,
        kind: RunnerKind,
        config: Vec<u8>,
        id: &ResourceId,
    ) -> Result<Box<dyn Runner>, JobError> {
        self.requests.write().await.push(SpawnRequest {
            kind,
            config,
            resource: id.clone(),
        });
        if let Some(err) = &self.spawn_error {
            return Err(err.clone());
        }
        Ok(Box::new(InMemoryRunner {
            outcome: self.outcome.clone(),
            resource: Some(id.clone()),
            runs: self.runs.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_create_table_reports_already_exists() {
        let store = InMemoryOnlineStore::new(ProviderType::RedisOnline);
        store.create_table("f", "v1", ValueType::Int).await.unwrap();
        let err = store.create_table("f", "v1", ValueType::Int).await.unwrap_err();
        assert!(JobError::from(err).is_already_exists());
        assert_eq!(store.create_calls(), 2);
    }

    #[tokio::test]
    async fn spawner_counts_runs_across_runners() {
        let spawner = InMemorySpawner::new();
        let id = ResourceId::feature("f", "v1");
        let runner = spawner.get_job_runner(RunnerKind::Materialize, Vec::new(), &id).await.unwrap();
        runner.run().await.unwrap().wait().await.unwrap();
        assert_eq!(spawner.runs(), 1);
        assert_eq!(runner.resource(), Some(id));
    }
}
