//! Task execution: the CLI command surface, output parsing, and the
//! engine that drives a task through its phases.

pub mod commands;
pub mod engine;
pub mod parse;

pub use engine::{ExecutionPhase, TaskExecutor};
pub use parse::DirectoryListing;
