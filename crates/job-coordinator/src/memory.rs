//! Process-local catalog.

use async_trait::async_trait;
use job_types::{FeatureVariant, MetadataClient, MetadataError, NameVariant, ProviderRecord, SourceStatus, SourceVariant};
use std::collections::HashMap;
use tokio::sync::RwLock;

type RunKey = (String, String);

#[derive(Default)]
struct Catalog {
    features: HashMap<NameVariant, FeatureVariant>,
    sources: HashMap<NameVariant, SourceVariant>,
    providers: HashMap<String, ProviderRecord>,
    run_logs: HashMap<RunKey, Vec<String>>,
    resume_ids: HashMap<RunKey, String>,
}

/// Catalog held in memory. Run logs and resume tokens are kept per (task, run).
#[derive(Default)]
pub struct InMemoryMetadata {
    inner: RwLock<Catalog>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, feature: FeatureVariant) -> Self {
        let key = NameVariant::new(&feature.name, &feature.variant);
        self.inner.get_mut().features.insert(key, feature);
        self
    }

    pub fn with_source(mut self, source: SourceVariant) -> Self {
        let key = NameVariant::new(&source.name, &source.variant);
        self.inner.get_mut().sources.insert(key, source);
        self
    }

    pub fn with_provider(mut self, provider: ProviderRecord) -> Self {
        self.inner
            .get_mut()
            .providers
            .insert(provider.name.clone(), provider);
        self
    }

    pub async fn set_source_status(&self, id: &NameVariant, status: SourceStatus) -> Result<(), MetadataError> {
        let mut guard = self.inner.write().await;
        let source = guard
            .sources
            .get_mut(id)
            .ok_or_else(|| MetadataError::NotFound(id.to_string()))?;
        source.status = status;
        Ok(())
    }

    pub async fn run_logs(&self, task_id: &str, run_id: &str) -> Vec<String> {
        let guard = self.inner.read().await;
        guard
            .run_logs
            .get(&(task_id.to_string(), run_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetadataClient for InMemoryMetadata {
    async fn get_feature_variant(&self, id: &NameVariant) -> Result<FeatureVariant, MetadataError> {
        let guard = self.inner.read().await;
        guard
            .features
            .get(id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("feature {}", id)))
    }

    async fn get_source_variant(&self, id: &NameVariant) -> Result<SourceVariant, MetadataError> {
        let guard = self.inner.read().await;
        guard
            .sources
            .get(id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("source {}", id)))
    }

    async fn get_provider(&self, name: &str) -> Result<ProviderRecord, MetadataError> {
        let guard = self.inner.read().await;
        guard
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("provider {}", name)))
    }

    async fn add_run_log(&self, task_id: &str, run_id: &str, message: &str) -> Result<(), MetadataError> {
        let mut guard = self.inner.write().await;
        guard
            .run_logs
            .entry((task_id.to_string(), run_id.to_string()))
            .or_default()
            .push(message.to_string());
        Ok(())
    }

    async fn get_resume_id(&self, task_id: &str, run_id: &str) -> Result<Option<String>, MetadataError> {
        let guard = self.inner.read().await;
        Ok(guard
            .resume_ids
            .get(&(task_id.to_string(), run_id.to_string()))
            .cloned())
    }

    async fn set_resume_id(&self, task_id: &str, run_id: &str, resume_id: &str) -> Result<(), MetadataError> {
        let mut guard = self.inner.write().await;
        guard
            .resume_ids
            .insert((task_id.to_string(), run_id.to_string()), resume_id.to_string());
        Ok(())
    }
}
