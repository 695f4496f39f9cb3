//! Per-analyst workload counts.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::rules::{Outcome, SelectedRecord};

/// Number of selected points assigned to one analyst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalystCount {
    /// Responsible analyst as written in the base table; may be blank.
    pub analyst: String,
    pub count: usize,
}

/// Count selected records per analyst, ordered by analyst.
pub fn summarize(selected: &[SelectedRecord]) -> Vec<AnalystCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for s in selected {
        *counts.entry(s.record.base.responsible_analyst.as_str()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(analyst, count)| AnalystCount {
            analyst: analyst.to_string(),
            count,
        })
        .collect()
}

/// Summary of an outcome; empty while the outcome is incomplete.
pub fn summarize_outcome(outcome: &Outcome) -> Vec<AnalystCount> {
    summarize(outcome.selected())
}
