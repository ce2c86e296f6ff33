//! Resource identifiers, store descriptors and materialization options.

use crate::JobError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of a catalog resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Feature,
    Label,
    TrainingSet,
    Transformation,
    Primary,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Feature => "Feature",
            ResourceType::Label => "Label",
            ResourceType::TrainingSet => "TrainingSet",
            ResourceType::Transformation => "Transformation",
            ResourceType::Primary => "Primary",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (kind, name, variant) triple identifying one unit of materializable work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub name: String,
    pub variant: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
}

impl ResourceId {
    pub fn new(
        resource_type: ResourceType,
        name: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
            resource_type,
        }
    }

    /// Identifier of a feature variant.
    pub fn feature(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::new(ResourceType::Feature, name, variant)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.resource_type, self.name, self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameVariant {
    pub name: String,
    pub variant: String,
}

impl NameVariant {
    pub fn new(name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for NameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.variant)
    }
}

/// Scalar type of a feature value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bool,
    Timestamp,
    Datetime,
}

/// Implementation type of a provider. Serialized names match the catalog's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    None,
    MemoryOffline,
    PostgresOffline,
    SnowflakeOffline,
    RedshiftOffline,
    BigqueryOffline,
    ClickhouseOffline,
    SparkOffline,
    K8sOffline,
    LocalOnline,
    RedisOnline,
    CassandraOnline,
    FirestoreOnline,
    DynamodbOnline,
    MongodbOnline,
    PineconeOnline,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::None => "NONE",
            ProviderType::MemoryOffline => "MEMORY_OFFLINE",
            ProviderType::PostgresOffline => "POSTGRES_OFFLINE",
            ProviderType::SnowflakeOffline => "SNOWFLAKE_OFFLINE",
            ProviderType::RedshiftOffline => "REDSHIFT_OFFLINE",
            ProviderType::BigqueryOffline => "BIGQUERY_OFFLINE",
            ProviderType::ClickhouseOffline => "CLICKHOUSE_OFFLINE",
            ProviderType::SparkOffline => "SPARK_OFFLINE",
            ProviderType::K8sOffline => "K8S_OFFLINE",
            ProviderType::LocalOnline => "LOCAL_ONLINE",
            ProviderType::RedisOnline => "REDIS_ONLINE",
            ProviderType::CassandraOnline => "CASSANDRA_ONLINE",
            ProviderType::FirestoreOnline => "FIRESTORE_ONLINE",
            ProviderType::DynamodbOnline => "DYNAMODB_ONLINE",
            ProviderType::MongodbOnline => "MONGODB_ONLINE",
            ProviderType::PineconeOnline => "PINECONE_ONLINE",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of file storage backing a file-based offline store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStoreKind {
    S3,
    Gcs,
    AzureBlob,
    Hdfs,
    Local,
}

impl fmt::Display for FileStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStoreKind::S3 => "s3",
            FileStoreKind::Gcs => "gcs",
            FileStoreKind::AzureBlob => "azure_blob",
            FileStoreKind::Hdfs => "hdfs",
            FileStoreKind::Local => "local",
        };
        f.write_str(s)
    }
}

/// Object-store address (`s3://bucket/key`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectPath {
    pub scheme: String,
    pub bucket: String,
    pub key: String,
}

impl ObjectPath {
    /// Parse `scheme://bucket/key`; a URI without a scheme is rejected.
    pub fn parse(uri: &str) -> Result<Self, JobError> {
        let (scheme, rest) = uri.split_once("://").ok_or_else(|| {
            JobError::invalid_argument("object path must have a scheme").with_detail("path", uri)
        })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if scheme.is_empty() || bucket.is_empty() {
            return Err(JobError::invalid_argument("object path must name a bucket")
                .with_detail("path", uri));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.trim_end_matches('/').to_string(),
        })
    }

    /// Path of `name` directly under this one.
    pub fn join(&self, name: &str) -> Self {
        let key = if self.key.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.key, name)
        };
        Self {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            key,
        }
    }

    /// Render back to `scheme://bucket/key`.
    pub fn to_uri(&self) -> String {
        if self.key.is_empty() {
            format!("{}://{}", self.scheme, self.bucket)
        } else {
            format!("{}://{}/{}", self.scheme, self.bucket, self.key)
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Where a source's rows live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    SqlTable {
        #[serde(default)]
        database: Option<String>,
        #[serde(default)]
        schema: Option<String>,
        name: String,
    },
    File {
        path: String,
    },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::SqlTable {
                database,
                schema,
                name,
            } => {
                for part in [database, schema].into_iter().flatten() {
                    write!(f, "{}.", part)?;
                }
                f.write_str(name)
            }
            Location::File { path } => f.write_str(path),
        }
    }
}

/// Column mapping of a feature over its source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub entity: String,
    pub value: String,
    #[serde(default)]
    pub ts: Option<String>,
    pub source_table: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

/// Options handed to a materialization, either directly or via a runner config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializationOptions {
    pub output: OutputFormat,
    pub should_include_headers: bool,
    pub max_job_duration: Duration,
    pub job_name: String,
    #[serde(default)]
    pub schema: Option<ResourceSchema>,
}

/// Capability query sent to an offline store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializationOptionType {
    /// The store can write rows straight into an online store of the given type.
    DirectCopy(ProviderType),
}

/// Provider entry as stored in the catalog: type plus an opaque config blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub name: String,
    pub provider_type: ProviderType,
    pub serialized_config: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceColumns {
    pub entity: String,
    pub value: String,
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVariant {
    pub name: String,
    pub variant: String,
    pub source: NameVariant,
    /// Online (inference) store provider name, if the feature is served.
    #[serde(default)]
    pub provider: Option<String>,
    pub value_type: ValueType,
    pub columns: ResourceColumns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVariant {
    pub name: String,
    pub variant: String,
    /// Offline store provider name.
    pub provider: String,
    pub status: SourceStatus,
    #[serde(default)]
    pub location: Option<Location>,
}
