//! Materialization orchestration.
//!
//! A [`FeatureTask`] resolves a feature's source and stores through the catalog, registers the
//! feature against its source table and then materializes it the cheapest way the stores allow:
//! a direct copy, an S3 import job, or a generic materialize job spawned through a
//! [`job_types::RunnerSpawner`]. [`TransformationTask`] drives a resumable Spark executor.

mod feature;
mod memory;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod runner_config;
mod spawner;
mod transformation;

pub use feature::{materialization_job_name, FeatureTask, Strategy, TaskContext};
pub use memory::InMemoryMetadata;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{
    InMemoryOfflineStore, InMemoryOnlineStore, InMemoryProviderFactory, InMemoryRunner,
    InMemorySpawner, InMemoryWatcher, RecordedMaterialization, SpawnRequest,
};
pub use runner_config::{import_from_s3_enabled, MaterializedRunnerConfig};
#[cfg(feature = "kubernetes")]
pub use spawner::KubeClientFactory;
pub use spawner::{JobClientFactory, KubernetesSpawner};
pub use transformation::{transformation_job_name, TransformationTask};
