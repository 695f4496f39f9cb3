//! One-to-many projection: fold every child row that shares a join key into
//! a single `" | "`-delimited field.

use std::collections::{HashMap, HashSet};

use triage_core::models::{Table, VALUE_DELIMITER};
use triage_core::normalize::normalize_key;
use triage_core::Result;

// ── concat_values ─────────────────────────────────────────────────────────────

/// Join the distinct non-null values in first-seen order with `" | "`.
///
/// Returns an empty string when every value is null.
pub fn concat_values<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut group = ValueGroup::default();
    for value in values.into_iter().flatten() {
        group.push(value);
    }
    group.join()
}

/// Distinct values of one group, in the order they were first seen.
#[derive(Debug, Default)]
struct ValueGroup {
    values: Vec<String>,
    seen: HashSet<String>,
}

impl ValueGroup {
    fn push(&mut self, value: &str) {
        if self.seen.insert(value.to_string()) {
            self.values.push(value.to_string());
        }
    }

    fn join(&self) -> String {
        self.values.join(VALUE_DELIMITER)
    }
}

// ── Aggregation ───────────────────────────────────────────────────────────────

/// Joined values per key, as produced by [`aggregate`] / [`aggregate_by`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    groups: HashMap<String, String>,
}

impl Aggregation {
    /// Joined value for `key`; `""` when the key had no (non-null) values.
    pub fn get(&self, key: &str) -> &str {
        self.groups.get(key).map(String::as_str).unwrap_or("")
    }

    /// Number of distinct keys seen, including keys whose values were all null.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Group `items` by `key` and fold `value` for each group.
///
/// Items whose key is `None` are skipped.
pub fn aggregate_by<T, K, V>(items: &[T], key: K, value: V) -> Aggregation
where
    K: for<'a> Fn(&'a T) -> Option<&'a str>,
    V: for<'a> Fn(&'a T) -> Option<&'a str>,
{
    let mut groups: HashMap<&str, ValueGroup> = HashMap::new();

    for item in items {
        let Some(k) = key(item) else {
            continue;
        };
        let group = groups.entry(k).or_default();
        if let Some(v) = value(item) {
            group.push(v);
        }
    }

    Aggregation {
        groups: groups
            .into_iter()
            .map(|(k, group)| (k.to_string(), group.join()))
            .collect(),
    }
}

/// Group the rows of `table` by `key_column` and fold `value_column`.
///
/// Keys are trimmed; blank keys are skipped. A missing column is a
/// [`TriageError::Schema`](triage_core::TriageError::Schema).
pub fn aggregate(table: &Table, key_column: &str, value_column: &str) -> Result<Aggregation> {
    let key_idx = table.require_column(key_column)?;
    let value_idx = table.require_column(value_column)?;

    let rows: Vec<(Option<String>, Option<&str>)> = table
        .rows
        .iter()
        .map(|row| (normalize_key(row[key_idx].as_deref()), row[value_idx].as_deref()))
        .collect();

    Ok(aggregate_by(&rows, |r| r.0.as_deref(), |r| r.1))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
