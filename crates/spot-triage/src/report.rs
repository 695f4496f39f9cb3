//! Plain-text rendering of a run for the terminal.

use std::fmt::Write as _;

use triage_core::formatting::{format_age, format_count};
use triage_data::analysis::PipelineOutput;
use triage_data::input::InputStatus;
use triage_data::rules::{Outcome, SelectedRecord};
use triage_data::summary::AnalystCount;
use unicode_width::UnicodeWidthStr;

/// Shown in place of a blank responsible analyst.
const UNASSIGNED: &str = "(unassigned)";

/// Longest cell printed before truncation.
const MAX_CELL_WIDTH: usize = 40;

// ── Sections ───────────────────────────────────────────────────────────────────

/// One line per expected input: provided with its file and row count, or
/// missing.
pub fn render_input_status(status: &[InputStatus]) -> String {
    let rows: Vec<Vec<String>> = status
        .iter()
        .map(|s| {
            let state = if s.provided { "ok" } else { "MISSING" };
            vec![
                s.kind.label().to_string(),
                state.to_string(),
                s.source.clone().unwrap_or_default(),
                if s.provided { format_count(s.rows) } else { String::new() },
            ]
        })
        .collect();
    render_table(&["input", "state", "file", "rows"], &rows)
}

/// The per-analyst counts with a total line.
pub fn render_summary(summary: &[AnalystCount]) -> String {
    let mut rows: Vec<Vec<String>> = summary
        .iter()
        .map(|c| vec![analyst_label(&c.analyst).to_string(), format_count(c.count)])
        .collect();
    let total: usize = summary.iter().map(|c| c.count).sum();
    rows.push(vec!["total".to_string(), format_count(total)]);
    render_table(&["analyst", "count"], &rows)
}

/// The prioritized list; with `explain` each row also names the clauses
/// that selected it.
pub fn render_selection(selected: &[SelectedRecord], explain: bool) -> String {
    let mut headers = vec!["analyst", "machine", "spot", "status", "last analysis", "age"];
    if explain {
        headers.push("reasons");
    }

    let rows: Vec<Vec<String>> = selected
        .iter()
        .map(|s| {
            let base = &s.record.base;
            let mut row = vec![
                analyst_label(&base.responsible_analyst).to_string(),
                base.machine.clone(),
                base.spot_name.clone(),
                s.record.monitoring_status.clone(),
                s.record.last_analysis_date.clone(),
                format_age(s.analysis_age),
            ];
            if explain {
                let reasons: Vec<&str> = s.clauses.iter().map(|c| c.label()).collect();
                row.push(reasons.join(", "));
            }
            row
        })
        .collect();
    render_table(&headers, &rows)
}

/// Everything printed after a run.
pub fn render_output(output: &PipelineOutput, explain: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Reference date {} · {} monitoring points reconciled",
        output.metadata.reference_date,
        format_count(output.metadata.records_reconciled)
    );

    match &output.outcome {
        Outcome::Incomplete { missing } => {
            let _ = writeln!(
                out,
                "\nWaiting for cutoffs: {}. Pass them with --alarm-days, --insight-days and --note-days.",
                missing.join(", ")
            );
        }
        Outcome::Ready(selected) if selected.is_empty() => {
            let _ = writeln!(out, "\nNo monitoring points need attention.");
        }
        Outcome::Ready(selected) => {
            let _ = writeln!(out, "\n{} points selected\n", format_count(selected.len()));
            out.push_str(&render_selection(selected, explain));
            let _ = writeln!(out, "\nPer analyst\n");
            out.push_str(&render_summary(&output.summary));
        }
    }
    out
}

fn analyst_label(analyst: &str) -> &str {
    if analyst.trim().is_empty() {
        UNASSIGNED
    } else {
        analyst
    }
}

// ── Table layout ───────────────────────────────────────────────────────────────

/// Left-aligned columns separated by two spaces, with a rule under the
/// header. Widths are measured in terminal columns.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.width().min(MAX_CELL_WIDTH));
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in rows {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| pad_right(cell, *w))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Pad with spaces to `width` columns, truncating with `..` when longer.
fn pad_right(s: &str, width: usize) -> String {
    let sw = s.width();
    if sw <= width {
        return format!("{}{}", s, " ".repeat(width - sw));
    }

    let budget = width.saturating_sub(2);
    let mut used = 0;
    let mut cut = String::new();
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > budget {
            break;
        }
        used += cw;
        cut.push(ch);
    }
    let truncated = format!("{}..", cut);
    let tw = truncated.width();
    format!("{}{}", truncated, " ".repeat(width.saturating_sub(tw)))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::models::{BaseRecord, EnrichedRecord, TableKind};
    use triage_core::normalize::Age;
    use triage_data::rules::Clause;

    fn selected(analyst: &str, machine: &str) -> SelectedRecord {
        let mut record = EnrichedRecord::unmatched(BaseRecord {
            machine: machine.into(),
            subassembly: String::new(),
            spot_id: "S1".into(),
            spot_name: "Redutor saída".into(),
            responsible_analyst: analyst.into(),
            cells: vec![],
        });
        record.monitoring_status = "A1".into();
        SelectedRecord {
            record,
            clauses: vec![Clause::StaleAlarm, Clause::PendingConfirmation],
            analysis_age: Age::Days(12),
            note_age: Age::Unknown,
        }
    }

    #[test]
    fn test_pad_right() {
        assert_eq!(pad_right("ab", 4), "ab  ");
        assert_eq!(pad_right("abcdef", 4), "ab..");
        assert_eq!(pad_right("ção", 4), "ção ");
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let out = render_table(
            &["a", "bb"],
            &[vec!["xxx".into(), "y".into()], vec!["z".into(), "wwww".into()]],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "a    bb");
        assert_eq!(lines[2], "xxx  y");
        assert_eq!(lines[3], "z    wwww");
    }

    #[test]
    fn test_render_summary_has_total_and_unassigned() {
        let out = render_summary(&[
            AnalystCount { analyst: "".into(), count: 1 },
            AnalystCount { analyst: "Ana".into(), count: 1_200 },
        ]);
        assert!(out.contains("(unassigned)"));
        assert!(out.lines().last().unwrap().contains("1,201"));
    }

    #[test]
    fn test_render_selection_explain_column() {
        let rows = [selected("Ana", "M-01")];
        let plain = render_selection(&rows, false);
        assert!(!plain.contains("reasons"));
        assert!(plain.contains("12d"));

        let explained = render_selection(&rows, true);
        assert!(explained.contains("stale alarm, pending confirmation"));
    }

    #[test]
    fn test_render_input_status_marks_missing() {
        let out = render_input_status(&[
            InputStatus {
                kind: TableKind::Base,
                source: Some("base.xlsx".into()),
                provided: true,
                rows: 1_500,
            },
            InputStatus {
                kind: TableKind::Mosaic,
                source: None,
                provided: false,
                rows: 0,
            },
        ]);
        assert!(out.contains("base.xlsx"));
        assert!(out.contains("1,500"));
        assert!(out.lines().any(|l| l.starts_with("mosaic") && l.contains("MISSING")));
    }
}
