//! Supervised background waits that always settle their ResumeOption.

use crate::ResumeOption;
use futures::FutureExt;
use job_types::JobError;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use tokio::task::JoinSet;

/// Writes the option's terminal result exactly once, whichever way the task exits.
struct Finisher {
    option: Option<ResumeOption>,
    label: String,
}

impl Finisher {
    fn finish(mut self, result: Result<(), JobError>) {
        if let Some(option) = self.option.take() {
            settle(&option, &self.label, result);
        }
    }
}

impl Drop for Finisher {
    fn drop(&mut self) {
        if let Some(option) = self.option.take() {
            settle(
                &option,
                &self.label,
                Err(JobError::internal("waiter stopped before the job finished")),
            );
        }
    }
}

fn settle(option: &ResumeOption, label: &str, result: Result<(), JobError>) {
    if let Err(e) = option.finish(result) {
        tracing::error!(task = label, error = %e, "unable to set result in resume option");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Owns detached completion waits.
///
/// Dropping the supervisor aborts its in-flight tasks; each aborted task still finishes its
/// option with an internal error.
#[derive(Default)]
pub struct TaskSupervisor {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` in the background and record its outcome in `option`.
    ///
    /// A panic inside `work` is recovered and recorded as an internal error.
    pub fn spawn_finishing<F>(&self, label: impl Into<String>, option: ResumeOption, work: F)
    where
        F: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let finisher = Finisher {
            option: Some(option),
            label: label.into(),
        };
        let task = async move {
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(task = %finisher.label, panic = %message, "background waiter panicked");
                    Err(JobError::internal("waiter panicked").with_detail("panic", message))
                }
            };
            finisher.finish(result);
        };
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Number of tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait for every task spawned so far.
    pub async fn join_all(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *guard)
        };
        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_types::ErrorKind;

    async fn exploding_wait() -> Result<(), JobError> {
        panic!("describe_step exploded")
    }

    #[tokio::test]
    async fn records_success() {
        let sup = TaskSupervisor::new();
        let opt = ResumeOption::new();
        sup.spawn_finishing("ok", opt.clone(), async { Ok::<(), JobError>(()) });
        opt.wait().await.unwrap();
        sup.join_all().await;
        assert_eq!(sup.in_flight(), 0);
    }

    #[tokio::test]
    async fn records_failure() {
        let sup = TaskSupervisor::new();
        let opt = ResumeOption::new();
        sup.spawn_finishing("fail", opt.clone(), async {
            Err::<(), JobError>(JobError::execution("step failed"))
        });
        let err = opt.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[tokio::test]
    async fn recovers_panic_as_internal_error() {
        let sup = TaskSupervisor::new();
        let opt = ResumeOption::new();
        sup.spawn_finishing("panics", opt.clone(), exploding_wait());
        let err = opt.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.detail("panic"), Some("describe_step exploded"));
    }

    #[tokio::test]
    async fn dropping_supervisor_settles_option() {
        let opt = ResumeOption::new();
        {
            let sup = TaskSupervisor::new();
            sup.spawn_finishing("never", opt.clone(), futures::future::pending::<Result<(), JobError>>());
            tokio::task::yield_now().await;
        }
        let err = opt.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn option_finished_elsewhere_is_not_overwritten() {
        let sup = TaskSupervisor::new();
        let opt = ResumeOption::new();
        opt.finish(Ok(())).unwrap();
        sup.spawn_finishing("late", opt.clone(), async {
            Err::<(), JobError>(JobError::execution("late failure"))
        });
        sup.join_all().await;
        assert!(opt.result().unwrap().is_ok());
    }
}
