//! Managed-cluster (EMR) step backend.
//!
//! Steps are submitted through a [`StepClient`], waited on with a hard bound (the step is
//! cancelled once the bound passes) and, when they fail, diagnosed from the cluster's
//! compressed step logs. Resumable submissions record an [`EmrResumeId`] and finish their wait
//! on a supervised background task.

mod client;
mod executor;
mod resume_id;
mod runner;

#[cfg(feature = "aws")]
mod aws;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

#[cfg(feature = "aws")]
pub use aws::{AwsStepClient, EmrConfig, S3LogStore, StaticCredentials};
pub use client::{ClusterDescription, StepClient, StepDescription, StepState};
pub use executor::{gunzip, EmrExecutor, SparkExecutor, SparkJobOptions, StepHandle};
pub use resume_id::EmrResumeId;
pub use runner::{EmrCompletionWatcher, EmrRunner};
