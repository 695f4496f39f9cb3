//! Tabular views of a run for the export writers.
//!
//! The writers themselves live in the binary; this module fixes the column
//! contract they all share.

use std::path::Path;

use triage_core::models::EnrichedSet;
use triage_core::Result;

use crate::rules::SelectedRecord;
use crate::summary::AnalystCount;

/// File the prioritized list is written to when no path is given.
pub const DEFAULT_EXPORT_FILE: &str = "LISTA_FINAL_PRIORIZADA.xlsx";

/// Sheet / table names used by every writer.
pub const SELECTION_SHEET: &str = "selection";
pub const SUMMARY_SHEET: &str = "summary";

/// A header row plus string rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub name: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Destination for a finished run.
pub trait Exporter {
    /// Write the selection and summary to `path`.
    fn export(
        &self,
        selection: &ExportTable,
        summary: &ExportTable,
        path: &Path,
    ) -> Result<()>;
}

/// Selected records in their output column order: base columns as read,
/// then the enrichment fields.
pub fn selection_table(enriched: &EnrichedSet, selected: &[SelectedRecord]) -> ExportTable {
    ExportTable {
        name: SELECTION_SHEET,
        headers: enriched.column_names(),
        rows: selected
            .iter()
            .map(|s| enriched.row_values(&s.record))
            .collect(),
    }
}

/// Per-analyst counts as an `analyst, count` table.
pub fn summary_table(summary: &[AnalystCount]) -> ExportTable {
    ExportTable {
        name: SUMMARY_SHEET,
        headers: vec!["analyst".to_string(), "count".to_string()],
        rows: summary
            .iter()
            .map(|c| vec![c.analyst.clone(), c.count.to_string()])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::models::{BaseRecord, EnrichedRecord};
    use triage_core::normalize::Age;

    use crate::rules::Clause;

    fn selected() -> (EnrichedSet, Vec<SelectedRecord>) {
        let mut record = EnrichedRecord::unmatched(BaseRecord {
            machine: "M-01".into(),
            subassembly: "M-01-GB".into(),
            spot_id: "S1".into(),
            spot_name: "Gearbox".into(),
            responsible_analyst: "Ana".into(),
            cells: vec!["M-01".into(), "S1".into(), "Ana".into()],
        });
        record.order_system_status = "LIB CONF".into();
        record.has_insight = true;

        let set = EnrichedSet {
            base_headers: vec!["MACHINE".into(), "SPOT_ID".into(), "RESPONSIBLE_ANALYST".into()],
            records: vec![record.clone()],
        };
        let selected = vec![SelectedRecord {
            record,
            clauses: vec![Clause::PendingConfirmation],
            analysis_age: Age::Unknown,
            note_age: Age::Unknown,
        }];
        (set, selected)
    }

    #[test]
    fn test_selection_table_column_contract() {
        let (set, selected) = selected();
        let table = selection_table(&set, &selected);

        assert_eq!(table.name, "selection");
        assert_eq!(table.headers.len(), 3 + 9);
        assert_eq!(table.headers[3], "monitoring_status");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][2], "Ana");
        assert_eq!(table.rows[0][5], "YES");
        assert_eq!(table.rows[0][9], "LIB CONF");
    }

    #[test]
    fn test_summary_table() {
        let table = summary_table(&[
            AnalystCount { analyst: "Ana".into(), count: 2 },
            AnalystCount { analyst: "Bruno".into(), count: 1 },
        ]);
        assert_eq!(table.headers, vec!["analyst", "count"]);
        assert_eq!(table.rows[1], vec!["Bruno", "1"]);
    }

    #[test]
    fn test_empty_selection_keeps_headers() {
        let (set, _) = selected();
        let table = selection_table(&set, &[]);
        assert!(table.rows.is_empty());
        assert_eq!(table.headers, set.column_names());
    }
}
