//! Gantry Runner
//!
//! The execution engine for pipeline runs.
//!
//! Architecture:
//! - Shell: process spawning with leveled output capture
//! - Executor: sequential stage execution for one matrix entry,
//!   honoring per-stage failure policy and the deploy gate
//! - Pipeline: matrix expansion and parallel, isolated runs

pub mod executor;
pub mod pipeline;
pub mod shell;

pub use executor::StageExecutor;
pub use pipeline::{Pipeline, PipelineReport};
pub use shell::{CommandRunner, ShellRunner};
