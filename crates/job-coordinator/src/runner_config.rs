//! Serialized runner configurations handed to a [`job_types::RunnerSpawner`].

use job_types::{
    JobError, MaterializationOptions, ProviderRecord, ProviderType, ResourceId, ValueType,
};
use serde::{Deserialize, Serialize};

/// Everything a materialize (or import) job needs to move one feature's rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedRunnerConfig {
    pub offline_type: ProviderType,
    pub offline_config: Vec<u8>,
    /// `ProviderType::None` when the feature has no online store.
    pub online_type: ProviderType,
    #[serde(default)]
    pub online_config: Vec<u8>,
    pub resource_id: ResourceId,
    pub value_type: ValueType,
    #[serde(default)]
    pub is_update: bool,
    pub options: MaterializationOptions,
}

impl MaterializedRunnerConfig {
    pub fn serialize(&self) -> Result<Vec<u8>, JobError> {
        serde_json::to_vec(self)
            .map_err(|e| JobError::internal(format!("could not serialize runner config: {}", e)))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, JobError> {
        serde_json::from_slice(data).map_err(|e| {
            JobError::invalid_argument(format!("could not deserialize runner config: {}", e))
        })
    }
}

/// The part of a DynamoDB provider config the orchestrator reads.
#[derive(Debug, Clone, Default, Deserialize)]
struct DynamodbConfig {
    #[serde(rename = "ImportFromS3", default)]
    import_from_s3: bool,
}

/// Whether `online` is a DynamoDB store configured to load data through S3 import.
pub fn import_from_s3_enabled(online: Option<&ProviderRecord>) -> Result<bool, JobError> {
    let Some(provider) = online else {
        return Ok(false);
    };
    if provider.provider_type != ProviderType::DynamodbOnline {
        return Ok(false);
    }
    tracing::debug!(provider = %provider.name, "feature provider is DynamoDB");
    let config: DynamodbConfig = serde_json::from_slice(&provider.serialized_config).map_err(|e| {
        JobError::invalid_argument(format!("could not deserialize DynamoDB config: {}", e))
            .with_detail("provider", &provider.name)
    })?;
    Ok(config.import_from_s3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_types::OutputFormat;
    use std::time::Duration;

    fn provider(provider_type: ProviderType, config: &str) -> ProviderRecord {
        ProviderRecord {
            name: "online".into(),
            provider_type,
            serialized_config: config.as_bytes().to_vec(),
        }
    }

    #[test]
    fn config_survives_serialization() {
        let config = MaterializedRunnerConfig {
            offline_type: ProviderType::SparkOffline,
            offline_config: b"{\"bucket\":\"b\"}".to_vec(),
            online_type: ProviderType::None,
            online_config: Vec::new(),
            resource_id: ResourceId::feature("f", "v1"),
            value_type: ValueType::Float32,
            is_update: false,
            options: MaterializationOptions {
                output: OutputFormat::Parquet,
                should_include_headers: true,
                max_job_duration: Duration::from_secs(3600),
                job_name: "featureform-materialization--f--v1".into(),
                schema: None,
            },
        };
        let bytes = config.serialize().unwrap();
        assert_eq!(MaterializedRunnerConfig::deserialize(&bytes).unwrap(), config);
    }

    #[test]
    fn garbage_config_is_invalid_argument() {
        let err = MaterializedRunnerConfig::deserialize(b"nope").unwrap_err();
        assert_eq!(err.kind(), job_types::ErrorKind::InvalidArgument);
    }

    #[test]
    fn import_flag_only_read_from_dynamodb() {
        assert!(!import_from_s3_enabled(None).unwrap());
        let redis = provider(ProviderType::RedisOnline, r#"{"ImportFromS3":true}"#);
        assert!(!import_from_s3_enabled(Some(&redis)).unwrap());
        let dynamo = provider(ProviderType::DynamodbOnline, r#"{"Region":"us-east-1","ImportFromS3":true}"#);
        assert!(import_from_s3_enabled(Some(&dynamo)).unwrap());
        let off = provider(ProviderType::DynamodbOnline, r#"{"Region":"us-east-1"}"#);
        assert!(!import_from_s3_enabled(Some(&off)).unwrap());
    }

    #[test]
    fn unreadable_dynamodb_config_fails() {
        let bad = provider(ProviderType::DynamodbOnline, "{");
        assert!(import_from_s3_enabled(Some(&bad)).is_err());
    }
}
