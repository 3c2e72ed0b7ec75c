//! Infrastructure layer: storage backends, process plumbing, scheduling and
//! the transaction pipeline that ties them together.

pub mod artifact;
pub mod heap;
pub mod jobs;
pub mod library;
pub mod orchestrator;
pub mod process;
pub mod unit;

pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, StateQuery};
