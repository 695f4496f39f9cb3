//! Data layer for Spot Triage.
//!
//! Reads the six exports, reconciles them onto the base table, applies the
//! selection rules and summarizes the result per analyst.

pub mod aggregator;
pub mod analysis;
pub mod export;
pub mod input;
pub mod reader;
pub mod reconciler;
pub mod rules;
pub mod summary;

pub use triage_core as core;
