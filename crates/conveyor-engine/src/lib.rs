//! Pipeline engine: extractors, transform chain, loader, run tracking,
//! and the orchestrator tying them together.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod dead_letter;
pub mod error;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod tracker;
pub mod transform;

pub use error::{PipelineError, RetryPolicy};
pub use orchestrator::{run_pipeline, run_status, RunOptions};
