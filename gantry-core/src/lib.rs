//! Gantry Core
//!
//! Core types and abstractions for the Gantry CI pipeline runner.
//!
//! This crate contains:
//! - Manifest types: the declarative pipeline configuration and build matrix
//! - Run domain types: triggers, stages, run state machine, results
//! - Log types: leveled log entries and the shared run log buffer
//! - The stage failure taxonomy

pub mod error;
pub mod log;
pub mod manifest;
pub mod run;
