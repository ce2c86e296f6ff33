//! Error taxonomy shared by runners, watchers, executors and the orchestrator.

use std::fmt;

/// Ordered key/value pairs attached to an error (job name, logs, step id, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetails {
    entries: Vec<(String, String)>,
    fix_suggestion: Option<String>,
}

impl ErrorDetails {
    /// An empty set with no fix suggestion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a detail.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value recorded under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Details in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.fix_suggestion.is_none()
    }

    pub fn fix_suggestion(&self) -> Option<&str> {
        self.fix_suggestion.as_deref()
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.entries {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
            first = false;
        }
        Ok(())
    }
}

/// Coarse classification of a [`JobError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Submission,
    Execution,
    Timeout,
    CancellationFailed,
    Internal,
    DatasetAlreadyExists,
    Connection,
    Store,
    Metadata,
}

/// Failure reported by an offline or online store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("dataset already exists: {0}")]
    AlreadyExists(String),
    #[error("dataset not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Other(String),
}

/// Failure reported by the metadata catalog.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("metadata error: {0}")]
    Other(String),
}

/// Error returned by every runner, watcher, executor and orchestrator operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("invalid argument: {message}")]
    InvalidArgument {
        message: String,
        details: ErrorDetails,
    },
    #[error("submission failed: {message}")]
    Submission {
        message: String,
        details: ErrorDetails,
    },
    #[error("execution failed: {message}")]
    Execution {
        message: String,
        details: ErrorDetails,
    },
    #[error("timed out: {message}")]
    Timeout {
        message: String,
        details: ErrorDetails,
    },
    #[error("cancellation failed: {message}")]
    CancellationFailed {
        message: String,
        details: ErrorDetails,
    },
    #[error("internal error: {message}")]
    Internal {
        message: String,
        details: ErrorDetails,
    },
    #[error("dataset already exists: {message}")]
    DatasetAlreadyExists {
        message: String,
        details: ErrorDetails,
    },
    #[error("connection error ({provider}): {message}")]
    Connection {
        provider: String,
        message: String,
        details: ErrorDetails,
    },
    #[error("store: {source}")]
    Store {
        #[source]
        source: StoreError,
        details: ErrorDetails,
    },
    #[error("metadata: {source}")]
    Metadata {
        #[source]
        source: MetadataError,
        details: ErrorDetails,
    },
}

impl From<StoreError> for JobError {
    fn from(source: StoreError) -> Self {
        Self::Store {
            source,
            details: ErrorDetails::new(),
        }
    }
}

impl From<MetadataError> for JobError {
    fn from(source: MetadataError) -> Self {
        Self::Metadata {
            source,
            details: ErrorDetails::new(),
        }
    }
}

impl JobError {
    /// Malformed input caught before anything reaches a backend.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    /// The backend refused to accept the job or step.
    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    /// Remote work reached a failed terminal state.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    /// A bounded wait ran out and the work was cancelled.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    /// A bounded wait ran out and cancelling the work failed too.
    pub fn cancellation_failed(message: impl Into<String>) -> Self {
        Self::CancellationFailed {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    /// Misconfiguration or a broken invariant, such as a second write to a completion slot.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    pub fn dataset_already_exists(message: impl Into<String>) -> Self {
        Self::DatasetAlreadyExists {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    /// A provider could not be reached or opened.
    pub fn connection(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            provider: provider.into(),
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Submission { .. } => ErrorKind::Submission,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CancellationFailed { .. } => ErrorKind::CancellationFailed,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::DatasetAlreadyExists { .. }
            | Self::Store {
                source: StoreError::AlreadyExists(_),
                ..
            } => ErrorKind::DatasetAlreadyExists,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Store { .. } => ErrorKind::Store,
            Self::Metadata { .. } => ErrorKind::Metadata,
        }
    }

    /// True for "table already exists" conditions, whichever layer raised them.
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::DatasetAlreadyExists
    }

    fn details_mut(&mut self) -> &mut ErrorDetails {
        match self {
            Self::InvalidArgument { details, .. }
            | Self::Submission { details, .. }
            | Self::Execution { details, .. }
            | Self::Timeout { details, .. }
            | Self::CancellationFailed { details, .. }
            | Self::Internal { details, .. }
            | Self::DatasetAlreadyExists { details, .. }
            | Self::Connection { details, .. }
            | Self::Store { details, .. }
            | Self::Metadata { details, .. } => details,
        }
    }

    /// Details attached to this error.
    pub fn details(&self) -> &ErrorDetails {
        match self {
            Self::InvalidArgument { details, .. }
            | Self::Submission { details, .. }
            | Self::Execution { details, .. }
            | Self::Timeout { details, .. }
            | Self::CancellationFailed { details, .. }
            | Self::Internal { details, .. }
            | Self::DatasetAlreadyExists { details, .. }
            | Self::Connection { details, .. }
            | Self::Store { details, .. }
            | Self::Metadata { details, .. } => details,
        }
    }

    /// Shorthand for looking up one detail.
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details().get(key)
    }

    /// Attach a detail, replacing any earlier value under the same key.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details_mut().insert(key, value);
        self
    }

    pub fn with_details<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            self = self.with_detail(k, v);
        }
        self
    }

    pub fn with_fix_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.details_mut().fix_suggestion = Some(suggestion.into());
        self
    }

    pub fn fix_suggestion(&self) -> Option<&str> {
        self.details().fix_suggestion()
    }
}
