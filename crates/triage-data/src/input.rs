//! The six uploaded tables of one run.

use std::collections::BTreeMap;

use triage_core::models::{Table, TableKind};
use triage_core::{Result, TriageError};

/// Whether one expected input has been supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputStatus {
    pub kind: TableKind,
    /// File name the table was read from, when known.
    pub source: Option<String>,
    pub provided: bool,
    pub rows: usize,
}

/// Tables collected so far, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct InputSet {
    tables: BTreeMap<TableKind, Table>,
    sources: BTreeMap<TableKind, String>,
}

/// All six tables, borrowed from a complete [`InputSet`].
#[derive(Debug, Clone, Copy)]
pub struct CompleteInputs<'a> {
    pub base: &'a Table,
    pub mosaic: &'a Table,
    pub notes: &'a Table,
    pub order_notes: &'a Table,
    pub order_plans: &'a Table,
    pub insights: &'a Table,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table under its own kind.
    pub fn insert(&mut self, table: Table) {
        self.sources.remove(&table.kind);
        self.tables.insert(table.kind, table);
    }

    /// Add a table and remember which file it came from.
    pub fn insert_from(&mut self, table: Table, source: impl Into<String>) {
        let kind = table.kind;
        self.tables.insert(kind, table);
        self.sources.insert(kind, source.into());
    }

    pub fn get(&self, kind: TableKind) -> Option<&Table> {
        self.tables.get(&kind)
    }

    /// Kinds that have not been supplied, in listing order.
    pub fn missing(&self) -> Vec<TableKind> {
        TableKind::ALL
            .into_iter()
            .filter(|k| !self.tables.contains_key(k))
            .collect()
    }

    /// One status line per expected input, in listing order.
    pub fn status(&self) -> Vec<InputStatus> {
        TableKind::ALL
            .into_iter()
            .map(|kind| InputStatus {
                kind,
                source: self.sources.get(&kind).cloned(),
                provided: self.tables.contains_key(&kind),
                rows: self.tables.get(&kind).map(Table::len).unwrap_or(0),
            })
            .collect()
    }

    /// Borrow all six tables, or fail with [`TriageError::MissingInput`]
    /// listing every absent one.
    pub fn complete(&self) -> Result<CompleteInputs<'_>> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(TriageError::MissingInput(missing));
        }
        let table = |kind| {
            self.tables
                .get(&kind)
                .ok_or_else(|| TriageError::MissingInput(vec![kind]))
        };
        Ok(CompleteInputs {
            base: table(TableKind::Base)?,
            mosaic: table(TableKind::Mosaic)?,
            notes: table(TableKind::Notes)?,
            order_notes: table(TableKind::OrderNotes)?,
            order_plans: table(TableKind::OrderPlans)?,
            insights: table(TableKind::Insights)?,
        })
    }
}

impl<'a> CompleteInputs<'a> {
    pub fn tables(&self) -> [&'a Table; 6] {
        [
            self.base,
            self.mosaic,
            self.notes,
            self.order_notes,
            self.order_plans,
            self.insights,
        ]
    }

    /// Check every table's required columns before anything is computed.
    pub fn validate(&self) -> Result<()> {
        self.tables().iter().try_for_each(|t| t.validate_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(kind: TableKind) -> Table {
        let headers: Vec<String> = kind.required_columns().iter().map(|c| c.to_string()).collect();
        let headers = if headers.is_empty() { vec!["machine".to_string()] } else { headers };
        Table::new(kind, headers)
    }

    #[test]
    fn test_missing_lists_every_absent_table() {
        let mut set = InputSet::new();
        set.insert(empty(TableKind::Base));
        set.insert(empty(TableKind::Notes));

        assert_eq!(
            set.missing(),
            vec![
                TableKind::Mosaic,
                TableKind::OrderNotes,
                TableKind::OrderPlans,
                TableKind::Insights
            ]
        );
        match set.complete() {
            Err(TriageError::MissingInput(kinds)) => assert_eq!(kinds.len(), 4),
            other => panic!("expected MissingInput, got {other:?}"),
        }
    }

    #[test]
    fn test_complete_when_all_present() {
        let mut set = InputSet::new();
        for kind in TableKind::ALL {
            set.insert(empty(kind));
        }
        let inputs = set.complete().expect("complete");
        assert_eq!(inputs.order_plans.kind, TableKind::OrderPlans);
        assert!(inputs.validate().is_ok());
    }

    #[test]
    fn test_status_reports_sources() {
        let mut set = InputSet::new();
        set.insert_from(empty(TableKind::Mosaic), "mosaic_export.csv");

        let status = set.status();
        assert_eq!(status.len(), 6);
        assert!(!status[0].provided);
        assert!(status[1].provided);
        assert_eq!(status[1].source.as_deref(), Some("mosaic_export.csv"));
    }

    #[test]
    fn test_validate_reports_schema_error() {
        let mut set = InputSet::new();
        for kind in TableKind::ALL {
            set.insert(empty(kind));
        }
        set.insert(Table::new(TableKind::OrderNotes, vec!["Ordem".to_string()]));

        let err = set.complete().unwrap().validate().unwrap_err();
        assert!(matches!(
            err,
            TriageError::Schema { table: TableKind::OrderNotes, ref column } if column == "Status_do_sistema"
        ));
    }
}
