//! ResumeID token and the ResumeOption completion slot.

use job_types::JobError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

/// Opaque, backend-specific token identifying submitted work well enough to reattach to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeId(String);

impl ResumeId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a [`ResumeOption`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    /// No token yet: a fresh submission is required.
    Unset,
    /// A token is recorded and the terminal result is still pending.
    Pending,
    /// A terminal result has been recorded.
    Finished,
}

type Slot = Option<Result<(), JobError>>;

struct Inner {
    resume_id: OnceLock<ResumeId>,
    result: watch::Sender<Slot>,
}

/// Process-local state for one resumable submission.
///
/// The token and the terminal result are each written at most once. Clones share state, so the
/// runner can record into the same option the orchestrator later waits on.
#[derive(Clone)]
pub struct ResumeOption {
    inner: Arc<Inner>,
}

impl ResumeOption {
    /// Option for a fresh submission.
    pub fn new() -> Self {
        let (result, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                resume_id: OnceLock::new(),
                result,
            }),
        }
    }

    /// Option reattaching to work submitted earlier, possibly by another process.
    pub fn with_resume_id(id: ResumeId) -> Self {
        let opt = Self::new();
        let _ = opt.inner.resume_id.set(id);
        opt
    }

    pub fn is_resume_id_set(&self) -> bool {
        self.inner.resume_id.get().is_some()
    }

    pub fn resume_id(&self) -> Option<&ResumeId> {
        self.inner.resume_id.get()
    }

    /// Record the token of a fresh submission. Fails if one is already recorded.
    pub fn set_resume_id(&self, id: ResumeId) -> Result<(), JobError> {
        if id.as_str().is_empty() {
            return Err(JobError::internal("cannot record an empty resume id"));
        }
        self.inner.resume_id.set(id).map_err(|rejected| {
            JobError::internal("resume id is already set")
                .with_detail("rejected_resume_id", rejected.into_string())
        })
    }

    /// Record the terminal result. A second call fails and leaves the first result in place.
    pub fn finish(&self, result: Result<(), JobError>) -> Result<(), JobError> {
        let mut incoming = Some(result);
        let stored = self.inner.result.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = incoming.take();
            true
        });
        if stored {
            Ok(())
        } else {
            let rejected = incoming
                .and_then(|r| r.err())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "ok".to_string());
            Err(JobError::internal("resume option is already finished")
                .with_detail("rejected_result", rejected))
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.result.borrow().is_some()
    }

    pub fn state(&self) -> ResumeState {
        if self.is_finished() {
            ResumeState::Finished
        } else if self.is_resume_id_set() {
            ResumeState::Pending
        } else {
            ResumeState::Unset
        }
    }

    /// Terminal result, if recorded.
    pub fn result(&self) -> Option<Result<(), JobError>> {
        self.inner.result.borrow().clone()
    }

    /// Block until a terminal result is recorded, then return it.
    pub async fn wait(&self) -> Result<(), JobError> {
        let mut rx = self.inner.result.subscribe();
        let slot = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| JobError::internal("resume option closed before finishing"))?;
        match &*slot {
            Some(result) => result.clone(),
            None => Err(JobError::internal("resume option woke without a result")),
        }
    }
}

impl Default for ResumeOption {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResumeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeOption")
            .field("resume_id", &self.resume_id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_types::ErrorKind;
    use std::time::Duration;

    #[test]
    fn lifecycle_states() {
        let opt = ResumeOption::new();
        assert_eq!(opt.state(), ResumeState::Unset);
        opt.set_resume_id(ResumeId::new("token")).unwrap();
        assert_eq!(opt.state(), ResumeState::Pending);
        opt.finish(Ok(())).unwrap();
        assert_eq!(opt.state(), ResumeState::Finished);
    }

    #[test]
    fn resume_id_is_written_once() {
        let opt = ResumeOption::new();
        opt.set_resume_id(ResumeId::new("a")).unwrap();
        let err = opt.set_resume_id(ResumeId::new("b")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(opt.resume_id().map(ResumeId::as_str), Some("a"));
    }

    #[test]
    fn reattached_option_rejects_new_id() {
        let opt = ResumeOption::with_resume_id(ResumeId::new("existing"));
        assert!(opt.is_resume_id_set());
        assert!(opt.set_resume_id(ResumeId::new("other")).is_err());
    }

    #[test]
    fn empty_resume_id_is_rejected() {
        let opt = ResumeOption::new();
        assert!(opt.set_resume_id(ResumeId::new("")).is_err());
        assert_eq!(opt.state(), ResumeState::Unset);
    }

    #[test]
    fn second_finish_fails_and_keeps_first_result() {
        let opt = ResumeOption::new();
        opt.finish(Err(JobError::execution("step failed"))).unwrap();
        let err = opt.finish(Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let stored = opt.result().unwrap().unwrap_err();
        assert_eq!(stored.kind(), ErrorKind::Execution);
    }

    #[tokio::test]
    async fn wait_observes_result_written_later() {
        let opt = ResumeOption::new();
        let writer = opt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.finish(Err(JobError::execution("boom"))).unwrap();
        });
        let err = opt.wait().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        // Later readers see the same result.
        let again = opt.wait().await.unwrap_err();
        assert_eq!(again.to_string(), err.to_string());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_finished() {
        let opt = ResumeOption::new();
        opt.finish(Ok(())).unwrap();
        opt.wait().await.unwrap();
    }
}
