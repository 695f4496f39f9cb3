use std::path::PathBuf;
use thiserror::Error;

use crate::models::TableKind;

/// All errors produced by the triage crates.
#[derive(Error, Debug)]
pub enum TriageError {
    /// One or more of the six required input tables was not supplied.
    #[error("Missing input tables: {}", format_kinds(.0))]
    MissingInput(Vec<TableKind>),

    /// A supplied table lacks a column the pipeline depends on.
    #[error("Table {table} is missing required column \"{column}\"")]
    Schema { table: TableKind, column: String },

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV or spreadsheet file could not be decoded into a table.
    #[error("Failed to decode {path}: {message}")]
    TableDecode { path: PathBuf, message: String },

    /// The file extension is not one of the supported table formats.
    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Writing the prioritized list failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the triage crates.
pub type Result<T> = std::result::Result<T, TriageError>;

fn format_kinds(kinds: &[TableKind]) -> String {
    kinds
        .iter()
        .map(|k| k.label())
        .collect::<Vec<_>>()
        .join(", ")
}
