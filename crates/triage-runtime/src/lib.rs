//! Runtime layer for Spot Triage.
//!
//! Caches reconciled inputs between runs and drives the watch loop that
//! re-runs the pipeline when an input file changes.

pub mod data_manager;
pub mod orchestrator;

pub use triage_core as core;
pub use triage_data as data;
