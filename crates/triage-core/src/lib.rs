//! Core types for Spot Triage.
//!
//! Table and record models, identifier/date normalization, the error
//! taxonomy, command-line settings and small formatting helpers shared by
//! the data, runtime and binary crates.

pub mod error;
pub mod formatting;
pub mod models;
pub mod normalize;
pub mod settings;
pub mod time_utils;

pub use error::{Result, TriageError};
