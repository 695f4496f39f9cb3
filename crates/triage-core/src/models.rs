use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TriageError};
use crate::normalize::{normalize_key, normalize_order_id};

/// Delimiter placed between values when a one-to-many relation is folded
/// into a single field.
pub const VALUE_DELIMITER: &str = " | ";

/// Column names the input tables must carry.
pub mod columns {
    pub const MACHINE: &str = "MACHINE";
    pub const SUBASSEMBLY: &str = "SUBASSEMBLY";
    pub const SPOT_ID: &str = "SPOT_ID";
    pub const SPOT_NAME: &str = "SPOT_NAME";
    pub const RESPONSIBLE_ANALYST: &str = "RESPONSIBLE_ANALYST";

    pub const MOSAIC_SPOT_ID: &str = "spotId";
    pub const MOSAIC_STATUS: &str = "status";
    pub const MOSAIC_ANALYSIS_CREATED_AT: &str = "analysisCreatedAt";

    pub const INSTALLATION_LOCATION: &str = "Local_de_instalacao";
    pub const ORDER: &str = "Ordem";
    pub const NOTE: &str = "Nota";
    pub const DESIRED_COMPLETION: &str = "Conclusão_desejada";
    pub const SYSTEM_STATUS: &str = "Status_do_sistema";
}

/// Names of the fields the reconciler appends to every base record, in
/// output order.
pub const ENRICHED_COLUMNS: [&str; 9] = [
    "monitoring_status",
    "last_analysis_date",
    "has_insight",
    "note_id",
    "note_order_id",
    "note_due_date",
    "order_system_status",
    "plan_order_id",
    "plan_order_status",
];

// ── TableKind ────────────────────────────────────────────────────────────────

/// The six exports the pipeline consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    Base,
    Mosaic,
    Notes,
    OrderNotes,
    OrderPlans,
    Insights,
}

impl TableKind {
    /// Every kind, in the order the inputs are listed to the user.
    pub const ALL: [TableKind; 6] = [
        TableKind::Base,
        TableKind::Mosaic,
        TableKind::Notes,
        TableKind::OrderNotes,
        TableKind::OrderPlans,
        TableKind::Insights,
    ];

    /// Short lowercase name used in messages and file discovery.
    pub fn label(&self) -> &'static str {
        match self {
            TableKind::Base => "base",
            TableKind::Mosaic => "mosaic",
            TableKind::Notes => "notes",
            TableKind::OrderNotes => "order-notes",
            TableKind::OrderPlans => "order-plans",
            TableKind::Insights => "insights",
        }
    }

    /// Columns that must be present in a table of this kind.
    ///
    /// The insights table is positional (first column), so it has no named
    /// requirement.
    pub fn required_columns(&self) -> &'static [&'static str] {
        use columns::*;
        match self {
            TableKind::Base => &[MACHINE, SUBASSEMBLY, SPOT_ID, SPOT_NAME, RESPONSIBLE_ANALYST],
            TableKind::Mosaic => &[MOSAIC_SPOT_ID, MOSAIC_STATUS, MOSAIC_ANALYSIS_CREATED_AT],
            TableKind::Notes => &[INSTALLATION_LOCATION, ORDER, NOTE, DESIRED_COMPLETION],
            TableKind::OrderNotes => &[ORDER, SYSTEM_STATUS],
            TableKind::OrderPlans => &[INSTALLATION_LOCATION, ORDER, SYSTEM_STATUS],
            TableKind::Insights => &[],
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Table ────────────────────────────────────────────────────────────────────

/// A single cell. `None` is a null (blank) cell.
pub type Cell = Option<String>;

/// A decoded export: ordered headers plus rows of optional string cells.
///
/// Rows are always exactly as wide as the header list.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub kind: TableKind,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given headers.
    pub fn new(kind: TableKind, headers: Vec<String>) -> Self {
        Self {
            kind,
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a table from plain strings; blank cells become nulls.
    pub fn from_strings<H, R, C>(kind: TableKind, headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut table = Table::new(kind, headers.into_iter().map(Into::into).collect());
        for row in rows {
            table.push_row(row.into_iter().map(|c| blank_to_null(c.into())).collect());
        }
        table
    }

    /// Append a row, padding with nulls or dropping overflow so it matches
    /// the header width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.headers.len(), None);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header list (exact, case-sensitive match).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like [`column_index`](Self::column_index) but a missing column is a
    /// [`TriageError::Schema`].
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| TriageError::Schema {
            table: self.kind,
            column: name.to_string(),
        })
    }

    /// Check every column required for this table's kind.
    pub fn validate_schema(&self) -> Result<()> {
        if self.kind == TableKind::Insights && self.headers.is_empty() {
            return Err(TriageError::Schema {
                table: self.kind,
                column: "<first column>".to_string(),
            });
        }
        for column in self.kind.required_columns() {
            self.require_column(column)?;
        }
        Ok(())
    }

    /// Iterate one column top to bottom.
    pub fn column_values(&self, col: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(col).and_then(|c| c.as_deref()))
    }
}

fn blank_to_null(value: String) -> Cell {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

// ── Source entities ──────────────────────────────────────────────────────────

/// One monitoring point from the base table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRecord {
    pub machine: String,
    pub subassembly: String,
    pub spot_id: String,
    pub spot_name: String,
    pub responsible_analyst: String,
    /// Every base cell in header order (nulls as empty strings), so the
    /// export can reproduce the input columns untouched.
    pub cells: Vec<String>,
}

impl BaseRecord {
    /// Read all base records. Missing required columns are fatal.
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        let machine = table.require_column(columns::MACHINE)?;
        let subassembly = table.require_column(columns::SUBASSEMBLY)?;
        let spot_id = table.require_column(columns::SPOT_ID)?;
        let spot_name = table.require_column(columns::SPOT_NAME)?;
        let analyst = table.require_column(columns::RESPONSIBLE_ANALYST)?;

        let records = table
            .rows
            .iter()
            .map(|row| {
                let text = |i: usize| row[i].clone().unwrap_or_default();
                BaseRecord {
                    machine: text(machine),
                    subassembly: text(subassembly),
                    spot_id: text(spot_id),
                    spot_name: text(spot_name),
                    responsible_analyst: text(analyst),
                    cells: row.iter().map(|c| c.clone().unwrap_or_default()).collect(),
                }
            })
            .collect();
        Ok(records)
    }
}

/// One analysis event from the monitoring platform export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicEntry {
    pub spot_id: Option<String>,
    pub status: Option<String>,
    pub analysis_created_at: Option<String>,
}

impl MosaicEntry {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        let spot_id = table.require_column(columns::MOSAIC_SPOT_ID)?;
        let status = table.require_column(columns::MOSAIC_STATUS)?;
        let created = table.require_column(columns::MOSAIC_ANALYSIS_CREATED_AT)?;

        Ok(table
            .rows
            .iter()
            .map(|row| MosaicEntry {
                spot_id: normalize_key(row[spot_id].as_deref()),
                status: row[status].clone(),
                analysis_created_at: row[created].clone(),
            })
            .collect())
    }
}

/// One M4 maintenance note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    pub installation_location: Option<String>,
    pub note_id: Option<String>,
    pub desired_completion: Option<String>,
    /// Order id with the spreadsheet `.0` artifact already removed.
    pub order_id: Option<String>,
}

impl NoteEntry {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        let location = table.require_column(columns::INSTALLATION_LOCATION)?;
        let order = table.require_column(columns::ORDER)?;
        let note = table.require_column(columns::NOTE)?;
        let completion = table.require_column(columns::DESIRED_COMPLETION)?;

        Ok(table
            .rows
            .iter()
            .map(|row| NoteEntry {
                installation_location: normalize_key(row[location].as_deref()),
                note_id: row[note].clone(),
                desired_completion: row[completion].clone(),
                order_id: row[order].as_deref().map(normalize_order_id),
            })
            .collect())
    }
}

/// Status of one maintenance order, looked up by order id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub order_id: Option<String>,
    pub system_status: Option<String>,
}

impl OrderStatus {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        let order = table.require_column(columns::ORDER)?;
        let status = table.require_column(columns::SYSTEM_STATUS)?;

        Ok(table
            .rows
            .iter()
            .map(|row| OrderStatus {
                order_id: normalize_key(row[order].as_deref()),
                system_status: row[status].clone(),
            })
            .collect())
    }
}

/// One asset-value-plan order, keyed by machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOrder {
    pub installation_location: Option<String>,
    pub order_id: Option<String>,
    pub system_status: Option<String>,
}

impl PlanOrder {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        let location = table.require_column(columns::INSTALLATION_LOCATION)?;
        let order = table.require_column(columns::ORDER)?;
        let status = table.require_column(columns::SYSTEM_STATUS)?;

        Ok(table
            .rows
            .iter()
            .map(|row| PlanOrder {
                installation_location: normalize_key(row[location].as_deref()),
                order_id: row[order].clone(),
                system_status: row[status].clone(),
            })
            .collect())
    }
}

// ── Enriched output ──────────────────────────────────────────────────────────

/// A base record plus everything the reconciler attached to it.
///
/// Every string field is either empty (no match) or a `" | "`-joined list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub base: BaseRecord,
    pub monitoring_status: String,
    pub last_analysis_date: String,
    pub has_insight: bool,
    pub note_id: String,
    pub note_order_id: String,
    pub note_due_date: String,
    pub order_system_status: String,
    pub plan_order_id: String,
    pub plan_order_status: String,
}

impl EnrichedRecord {
    /// A record with no matches in any child table.
    pub fn unmatched(base: BaseRecord) -> Self {
        Self {
            base,
            monitoring_status: String::new(),
            last_analysis_date: String::new(),
            has_insight: false,
            note_id: String::new(),
            note_order_id: String::new(),
            note_due_date: String::new(),
            order_system_status: String::new(),
            plan_order_id: String::new(),
            plan_order_status: String::new(),
        }
    }

    /// Enriched fields rendered as text, in [`ENRICHED_COLUMNS`] order.
    pub fn enriched_values(&self) -> [String; 9] {
        [
            self.monitoring_status.clone(),
            self.last_analysis_date.clone(),
            crate::formatting::format_flag(self.has_insight).to_string(),
            self.note_id.clone(),
            self.note_order_id.clone(),
            self.note_due_date.clone(),
            self.order_system_status.clone(),
            self.plan_order_id.clone(),
            self.plan_order_status.clone(),
        ]
    }
}

/// The reconciled record set together with the base table's header list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedSet {
    pub base_headers: Vec<String>,
    pub records: Vec<EnrichedRecord>,
}

impl EnrichedSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Output column contract: base headers, then [`ENRICHED_COLUMNS`].
    pub fn column_names(&self) -> Vec<String> {
        self.base_headers
            .iter()
            .cloned()
            .chain(ENRICHED_COLUMNS.iter().map(|c| c.to_string()))
            .collect()
    }

    /// One output row matching [`column_names`](Self::column_names).
    pub fn row_values(&self, record: &EnrichedRecord) -> Vec<String> {
        let mut row = record.base.cells.clone();
        row.resize(self.base_headers.len(), String::new());
        row.extend(record.enriched_values());
        row
    }
}

// ── Rule parameters ──────────────────────────────────────────────────────────

/// Alarm tags recognised in the monitoring status text.
pub const DEFAULT_ALARM_CODES: [&str; 2] = ["A1", "A2"];

/// Day thresholds for the selection rules. Any of them may still be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cutoffs {
    pub alarm_days: Option<i64>,
    pub insight_days: Option<i64>,
    pub note_days: Option<i64>,
}

impl Cutoffs {
    pub fn new(alarm_days: i64, insight_days: i64, note_days: i64) -> Self {
        Self {
            alarm_days: Some(alarm_days),
            insight_days: Some(insight_days),
            note_days: Some(note_days),
        }
    }

    /// Names of the cutoffs that have not been provided yet.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.alarm_days.is_none() {
            missing.push("alarm_days");
        }
        if self.insight_days.is_none() {
            missing.push("insight_days");
        }
        if self.note_days.is_none() {
            missing.push("note_days");
        }
        missing
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
