//! Resumable execution.
//!
//! A submission that runs for hours records a [`ResumeId`] in a [`ResumeOption`] as soon as the
//! backend accepts it; a background wait owned by a [`TaskSupervisor`] later writes the terminal
//! result into the same option. A new process that finds a persisted token reattaches instead of
//! resubmitting.

mod option;
mod supervisor;

pub use option::{ResumeId, ResumeOption, ResumeState};
pub use supervisor::TaskSupervisor;
