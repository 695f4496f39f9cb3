//! Selection rules: which monitoring points need an analyst's attention.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;
use triage_core::models::{Cutoffs, EnrichedRecord, EnrichedSet, DEFAULT_ALARM_CODES};
use triage_core::normalize::{
    contains_ignore_case, day_age, has_confirmation_token, normalize_date, Age,
};

/// One of the four independent selection clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Clause {
    /// Alarmed point whose last analysis is too old (or unknown).
    StaleAlarm,
    /// Point with an open insight whose last analysis is too old (or unknown).
    StaleInsight,
    /// Maintenance note past its desired completion date.
    OverdueNote,
    /// Order waiting for confirmation.
    PendingConfirmation,
}

impl Clause {
    pub fn label(&self) -> &'static str {
        match self {
            Clause::StaleAlarm => "stale alarm",
            Clause::StaleInsight => "stale insight",
            Clause::OverdueNote => "overdue note",
            Clause::PendingConfirmation => "pending confirmation",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the evaluator needs besides the records themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleParams {
    pub cutoffs: Cutoffs,
    /// Alarm tags searched for in `monitoring_status`. Empty disables the
    /// stale-alarm clause.
    pub alarm_codes: Vec<String>,
    /// Reference date ages are measured against.
    pub today: NaiveDate,
}

impl RuleParams {
    /// Parameters with the default alarm codes.
    pub fn new(cutoffs: Cutoffs, today: NaiveDate) -> Self {
        Self {
            cutoffs,
            alarm_codes: DEFAULT_ALARM_CODES.iter().map(|c| c.to_string()).collect(),
            today,
        }
    }

    pub fn with_alarm_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alarm_codes = codes.into_iter().map(Into::into).collect();
        self
    }
}

/// A record that passed the filter, with the reasons it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRecord {
    pub record: EnrichedRecord,
    /// Clauses that fired, in declaration order. Never empty.
    pub clauses: Vec<Clause>,
    pub analysis_age: Age,
    pub note_age: Age,
}

/// Result of a rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// At least one cutoff has not been supplied; nothing was evaluated.
    Incomplete { missing: Vec<&'static str> },
    /// The sorted selection, possibly empty.
    Ready(Vec<SelectedRecord>),
}

impl Outcome {
    /// Selected records; empty while incomplete.
    pub fn selected(&self) -> &[SelectedRecord] {
        match self {
            Outcome::Ready(selected) => selected.as_slice(),
            Outcome::Incomplete { .. } => &[],
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Outcome::Incomplete { .. })
    }
}

/// Apply the four clauses to every record and sort what survives by
/// (analyst, machine, spot name).
pub fn evaluate(enriched: &EnrichedSet, params: &RuleParams) -> Outcome {
    let (Some(alarm_days), Some(insight_days), Some(note_days)) = (
        params.cutoffs.alarm_days,
        params.cutoffs.insight_days,
        params.cutoffs.note_days,
    ) else {
        let missing = params.cutoffs.missing();
        debug!(?missing, "cutoffs incomplete, skipping evaluation");
        return Outcome::Incomplete { missing };
    };

    let mut selected: Vec<SelectedRecord> = enriched
        .records
        .iter()
        .filter_map(|record| {
            let analysis_age = day_age(normalize_date(&record.last_analysis_date), params.today);
            let note_age = day_age(normalize_date(&record.note_due_date), params.today);

            let mut clauses = Vec::new();
            if has_alarm(&record.monitoring_status, &params.alarm_codes)
                && analysis_age.is_stale(alarm_days)
            {
                clauses.push(Clause::StaleAlarm);
            }
            if record.has_insight && analysis_age.is_stale(insight_days) {
                clauses.push(Clause::StaleInsight);
            }
            if !record.note_id.is_empty() && matches!(note_age, Age::Days(d) if d > note_days) {
                clauses.push(Clause::OverdueNote);
            }
            if has_confirmation_token(&record.order_system_status) {
                clauses.push(Clause::PendingConfirmation);
            }

            (!clauses.is_empty()).then(|| SelectedRecord {
                record: record.clone(),
                clauses,
                analysis_age,
                note_age,
            })
        })
        .collect();

    selected.sort_by(|a, b| sort_key(&a.record).cmp(&sort_key(&b.record)));

    debug!(
        total = enriched.len(),
        selected = selected.len(),
        "rules evaluated"
    );
    Outcome::Ready(selected)
}

fn has_alarm(status: &str, codes: &[String]) -> bool {
    codes.iter().any(|code| contains_ignore_case(status, code))
}

fn sort_key(record: &EnrichedRecord) -> (&str, &str, &str) {
    (
        record.base.responsible_analyst.as_str(),
        record.base.machine.as_str(),
        record.base.spot_name.as_str(),
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
