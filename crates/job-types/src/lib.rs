//! Core types and traits for materialization job orchestration.
//!
//! Runners submit remote work and hand back completion watchers; the orchestrator talks to
//! the catalog and the stores only through the collaborator traits defined here.

mod config;
mod dto;
mod error;
mod traits;

pub use config::*;
pub use dto::*;
pub use error::*;
pub use traits::*;
