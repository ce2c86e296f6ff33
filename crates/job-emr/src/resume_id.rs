//! Versioned resume token for a submitted step.

use job_resume::ResumeId;
use job_types::JobError;
use serde::{Deserialize, Serialize};

const CURRENT_SCHEMA_VERSION: u32 = 0;

/// Cluster and step a resumable submission is running as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmrResumeId {
    pub cluster_id: String,
    pub step_id: String,
}

/// Stored form. Bump the version and branch in `unmarshal` when the layout changes.
#[derive(Serialize, Deserialize)]
struct RecordV0 {
    schema_version: u32,
    cluster_id: String,
    step_id: String,
}

impl EmrResumeId {
    pub fn new(cluster_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            step_id: step_id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.cluster_id.is_empty() {
            return Err(JobError::internal("EMR resume id must have a cluster id set")
                .with_detail("step_id", &self.step_id));
        }
        if self.step_id.is_empty() {
            return Err(JobError::internal("EMR resume id must have a step id set")
                .with_detail("cluster_id", &self.cluster_id));
        }
        Ok(())
    }

    pub fn marshal(&self) -> Result<ResumeId, JobError> {
        self.validate()?;
        let record = RecordV0 {
            schema_version: CURRENT_SCHEMA_VERSION,
            cluster_id: self.cluster_id.clone(),
            step_id: self.step_id.clone(),
        };
        let data = serde_json::to_string(&record)
            .map_err(|e| JobError::internal(format!("unable to serialize EMR resume id: {}", e)))?;
        Ok(ResumeId::new(data))
    }

    /// Parse and validate a token. Unknown schema versions are rejected.
    pub fn unmarshal(id: &ResumeId) -> Result<Self, JobError> {
        let invalid = |reason: String| {
            JobError::invalid_argument(format!("malformed EMR resume id: {}", reason))
                .with_detail("resume_id", id.as_str())
        };
        let value: serde_json::Value =
            serde_json::from_str(id.as_str()).map_err(|e| invalid(e.to_string()))?;
        match value.get("schema_version").and_then(serde_json::Value::as_u64) {
            Some(v) if v == u64::from(CURRENT_SCHEMA_VERSION) => {}
            Some(v) => return Err(invalid(format!("unsupported schema version {}", v))),
            None => return Err(invalid("missing schema version".to_string())),
        }
        let record: RecordV0 = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        let parsed = Self::new(record.cluster_id, record.step_id);
        parsed
            .validate()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_types::ErrorKind;

    #[test]
    fn round_trips() {
        let id = EmrResumeId::new("j-2AXXXXXXGAPLF", "s-1234ABCDEFGH");
        let token = id.marshal().unwrap();
        assert!(token.as_str().contains("\"schema_version\":0"));
        assert_eq!(EmrResumeId::unmarshal(&token).unwrap(), id);
    }

    #[test]
    fn marshal_requires_both_fields() {
        assert!(EmrResumeId::new("", "s-1").marshal().is_err());
        assert!(EmrResumeId::new("j-1", "").marshal().is_err());
    }

    #[test]
    fn unmarshal_rejects_garbage() {
        let full = EmrResumeId::new("j-1", "s-1").marshal().unwrap();
        let truncated = &full.as_str()[..full.as_str().len() / 2];
        for raw in ["", "not json", truncated, "{}", "[1,2]"] {
            let err = EmrResumeId::unmarshal(&ResumeId::new(raw)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{:?}", raw);
        }
    }

    #[test]
    fn unmarshal_rejects_empty_fields() {
        let raw = r#"{"schema_version":0,"cluster_id":"j-1","step_id":""}"#;
        assert!(EmrResumeId::unmarshal(&ResumeId::new(raw)).is_err());
    }

    #[test]
    fn unknown_schema_version_is_fatal() {
        let raw = r#"{"schema_version":1,"cluster_id":"j-1","step_id":"s-1"}"#;
        let err = EmrResumeId::unmarshal(&ResumeId::new(raw)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("unsupported schema version 1"));
    }
}
