//! Joins the child exports onto the base table.
//!
//! Produces exactly one [`EnrichedRecord`] per base row, in base order. Child
//! rows that match nothing are ignored and base rows that match nothing get
//! empty fields; neither is an error. Missing columns are.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;
use triage_core::models::{
    BaseRecord, EnrichedRecord, EnrichedSet, MosaicEntry, NoteEntry, OrderStatus, PlanOrder,
    Table, VALUE_DELIMITER,
};
use triage_core::normalize::{format_analysis_timestamp, is_see_more_artifact};
use triage_core::Result;

use crate::aggregator::{aggregate_by, concat_values};
use crate::input::CompleteInputs;

/// Build the enriched record set from a complete input set.
///
/// Every table's schema is checked before any join runs, so a bad input
/// never yields partial output.
pub fn reconcile(inputs: &CompleteInputs<'_>) -> Result<EnrichedSet> {
    inputs.validate()?;

    let base = BaseRecord::from_table(inputs.base)?;
    let mosaic = MosaicEntry::from_table(inputs.mosaic)?;
    let notes = NoteEntry::from_table(inputs.notes)?;
    let orders = OrderStatus::from_table(inputs.order_notes)?;
    let plans = PlanOrder::from_table(inputs.order_plans)?;
    let insights = clean_insights(inputs.insights);

    debug!(
        base = base.len(),
        mosaic = mosaic.len(),
        notes = notes.len(),
        orders = orders.len(),
        plans = plans.len(),
        insights = insights.len(),
        "reconciling inputs"
    );

    let records = enrich(base, &mosaic, &notes, &orders, &plans, &insights);

    Ok(EnrichedSet {
        base_headers: inputs.base.headers.clone(),
        records,
    })
}

/// Attach every derived field to `base`, preserving its order and length.
pub fn enrich(
    base: Vec<BaseRecord>,
    mosaic: &[MosaicEntry],
    notes: &[NoteEntry],
    orders: &[OrderStatus],
    plans: &[PlanOrder],
    insights: &HashSet<String>,
) -> Vec<EnrichedRecord> {
    // 1–2: monitoring status and last analysis date, by spot.
    let status_by_spot = aggregate_by(mosaic, |m| m.spot_id.as_deref(), |m| m.status.as_deref());
    let dated: Vec<(Option<&str>, Option<String>)> = mosaic
        .iter()
        .map(|m| {
            let day = m.analysis_created_at.as_deref().and_then(format_analysis_timestamp);
            (m.spot_id.as_deref(), day)
        })
        .collect();
    let date_by_spot = aggregate_by(&dated, |d| d.0, |d| d.1.as_deref());

    // 4: notes, by subassembly.
    let note_by_sub = aggregate_by(
        notes,
        |n| n.installation_location.as_deref(),
        |n| n.note_id.as_deref(),
    );
    let note_order_by_sub = aggregate_by(
        notes,
        |n| n.installation_location.as_deref(),
        |n| n.order_id.as_deref(),
    );
    let note_due_by_sub = aggregate_by(
        notes,
        |n| n.installation_location.as_deref(),
        |n| n.desired_completion.as_deref(),
    );

    // 6: plan orders, by machine.
    let plan_order_by_machine = aggregate_by(
        plans,
        |p| p.installation_location.as_deref(),
        |p| p.order_id.as_deref(),
    );
    let plan_status_by_machine = aggregate_by(
        plans,
        |p| p.installation_location.as_deref(),
        |p| p.system_status.as_deref(),
    );

    let mut records: Vec<EnrichedRecord> = base
        .into_iter()
        .map(|b| {
            let spot = b.spot_id.trim().to_string();
            let sub = b.subassembly.trim().to_string();
            let machine = b.machine.trim().to_string();

            let mut r = EnrichedRecord::unmatched(b);
            r.monitoring_status = status_by_spot.get(&spot).to_string();
            r.last_analysis_date = date_by_spot.get(&spot).to_string();
            // 3: insight flag.
            r.has_insight = !machine.is_empty() && insights.contains(&machine);
            r.note_id = note_by_sub.get(&sub).to_string();
            r.note_order_id = note_order_by_sub.get(&sub).to_string();
            r.note_due_date = note_due_by_sub.get(&sub).to_string();
            r.plan_order_id = plan_order_by_machine.get(&machine).to_string();
            r.plan_order_status = plan_status_by_machine.get(&machine).to_string();
            r
        })
        .collect();

    // 5: order system status, resolved per record from its note orders.
    let note_order_ids: Vec<&str> = records.iter().map(|r| r.note_order_id.as_str()).collect();
    let statuses = resolve_order_status(&note_order_ids, orders);
    for (record, status) in records.iter_mut().zip(statuses) {
        record.order_system_status = status;
    }

    records
}

/// Look up the system status of every order referenced by each record.
///
/// `note_order_ids[i]` is record `i`'s joined order list. The result has the
/// same length; records with no orders or no matches get `""`.
pub fn resolve_order_status(note_order_ids: &[&str], orders: &[OrderStatus]) -> Vec<String> {
    // (a) flat (record index, order id) pairs.
    let pairs: Vec<(usize, &str)> = note_order_ids
        .iter()
        .enumerate()
        .flat_map(|(idx, joined)| {
            joined
                .split(VALUE_DELIMITER)
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(move |id| (idx, id))
        })
        .collect();

    if pairs.is_empty() {
        return vec![String::new(); note_order_ids.len()];
    }

    // (b) lookup, keeping every status an order id maps to in table order.
    let mut by_order: HashMap<&str, Vec<&str>> = HashMap::new();
    for order in orders {
        if let Some(id) = order.order_id.as_deref() {
            by_order
                .entry(id)
                .or_default()
                .extend(order.system_status.as_deref());
        }
    }

    // (c) regroup by record index.
    let mut grouped: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for (idx, id) in &pairs {
        let statuses = by_order.get(id).map(Vec::as_slice).unwrap_or(&[]);
        grouped.entry(*idx).or_default().extend(statuses.iter().copied());
    }

    // (d) one entry per original record, empty where nothing matched.
    (0..note_order_ids.len())
        .map(|idx| match grouped.get(&idx) {
            Some(statuses) => concat_values(statuses.iter().map(|s| Some(*s))),
            None => String::new(),
        })
        .collect()
}

/// Machine ids from the first column of the insights export, trimmed, with
/// blanks and `See more (N)` artifact rows removed.
pub fn clean_insights(table: &Table) -> HashSet<String> {
    if table.headers.is_empty() {
        return HashSet::new();
    }
    table
        .column_values(0)
        .flatten()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !is_see_more_artifact(v))
        .map(str::to_string)
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::models::TableKind;
    use triage_core::TriageError;

    use crate::input::InputSet;

    fn order(id: &str, status: &str) -> OrderStatus {
        OrderStatus {
            order_id: Some(id.to_string()),
            system_status: Some(status.to_string()),
        }
    }

    fn inputs() -> InputSet {
        let mut set = InputSet::new();
        set.insert(Table::from_strings(
            TableKind::Base,
            ["MACHINE", "SUBASSEMBLY", "SPOT_ID", "SPOT_NAME", "RESPONSIBLE_ANALYST"],
            vec![
                vec!["M-01", "M-01-GB", "S1", "Gearbox DE", "Ana"],
                vec!["M-01", "M-01-MT", "S2", "Motor NDE", "Ana"],
                vec!["M-02", "M-02-PU", "S3", "Pump", "Bruno"],
            ],
        ));
        set.insert(Table::from_strings(
            TableKind::Mosaic,
            ["spotId", "status", "analysisCreatedAt"],
            vec![
                vec!["S1", "A1", "2024-01-05T08:00:00Z"],
                vec!["S1", "A1", "2024-01-05T17:00:00Z"],
                vec!["S2", "OK", "garbage"],
            ],
        ));
        set.insert(Table::from_strings(
            TableKind::Notes,
            ["Local_de_instalacao", "Ordem", "Nota", "Conclusão_desejada"],
            vec![
                vec!["M-01-GB", "4001.0", "N-1", "01.02.2024"],
                vec!["M-01-GB", "4002", "N-2", "03/02/2024"],
                vec!["M-02-PU", "", "N-3", ""],
            ],
        ));
        set.insert(Table::from_strings(
            TableKind::OrderNotes,
            ["Ordem", "Status_do_sistema"],
            vec![vec!["4001", "LIB CONF"], vec!["4002", "ENTE"], vec!["9999", "LIB"]],
        ));
        set.insert(Table::from_strings(
            TableKind::OrderPlans,
            ["Local_de_instalacao", "Ordem", "Status_do_sistema"],
            vec![vec!["M-02", "7001", "ABER"], vec!["M-02", "7002", "ABER"]],
        ));
        set.insert(Table::from_strings(
            TableKind::Insights,
            ["Machine"],
            vec![vec!["M-02"], vec!["See more (3)"], vec![" M-02 "]],
        ));
        set
    }

    // ── reconcile ─────────────────────────────────────────────────────────────

    #[test]
    fn test_reconcile_attaches_every_field() {
        let set = inputs();
        let enriched = reconcile(&set.complete().unwrap()).unwrap();
        assert_eq!(enriched.len(), 3);

        let s1 = &enriched.records[0];
        assert_eq!(s1.monitoring_status, "A1");
        assert_eq!(s1.last_analysis_date, "05/01/2024");
        assert!(!s1.has_insight);
        assert_eq!(s1.note_id, "N-1 | N-2");
        assert_eq!(s1.note_order_id, "4001 | 4002");
        assert_eq!(s1.note_due_date, "01.02.2024 | 03/02/2024");
        assert_eq!(s1.order_system_status, "LIB CONF | ENTE");
        assert_eq!(s1.plan_order_id, "");

        let s2 = &enriched.records[1];
        assert_eq!(s2.monitoring_status, "OK");
        assert_eq!(s2.last_analysis_date, "", "unparseable timestamps are dropped");
        assert_eq!(s2.note_id, "");
        assert_eq!(s2.order_system_status, "");

        let s3 = &enriched.records[2];
        assert!(s3.has_insight);
        assert_eq!(s3.note_id, "N-3");
        assert_eq!(s3.note_order_id, "");
        assert_eq!(s3.plan_order_id, "7001 | 7002");
        assert_eq!(s3.plan_order_status, "ABER");
    }

    #[test]
    fn test_reconcile_keeps_base_headers() {
        let set = inputs();
        let enriched = reconcile(&set.complete().unwrap()).unwrap();
        assert_eq!(enriched.base_headers[0], "MACHINE");
        assert_eq!(enriched.records[2].base.cells[3], "Pump");
    }

    #[test]
    fn test_reconcile_schema_error_aborts() {
        let mut set = inputs();
        set.insert(Table::from_strings(
            TableKind::Notes,
            ["Local_de_instalacao", "Ordem", "Nota"],
            Vec::<Vec<&str>>::new(),
        ));
        let err = reconcile(&set.complete().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            TriageError::Schema { table: TableKind::Notes, ref column } if column == "Conclusão_desejada"
        ));
    }

    // ── resolve_order_status ──────────────────────────────────────────────────

    #[test]
    fn test_resolve_order_status_keeps_one_row_per_record() {
        let orders = vec![order("1", "LIB CONF"), order("2", "ENTE")];
        let ids = ["", "1 | 2", "", "3", "2"];
        let resolved = resolve_order_status(&ids, &orders);
        assert_eq!(resolved, vec!["", "LIB CONF | ENTE", "", "", "ENTE"]);
    }

    #[test]
    fn test_resolve_order_status_all_empty() {
        let resolved = resolve_order_status(&["", "", ""], &[order("1", "LIB")]);
        assert_eq!(resolved, vec![String::new(); 3]);
    }

    #[test]
    fn test_resolve_order_status_empty_base() {
        assert!(resolve_order_status(&[], &[order("1", "LIB")]).is_empty());
    }

    #[test]
    fn test_resolve_order_status_dedups_shared_statuses() {
        let orders = vec![order("1", "LIB"), order("2", "LIB"), order("1", "CONF")];
        let resolved = resolve_order_status(&["2 | 1"], &orders);
        assert_eq!(resolved, vec!["LIB | CONF"]);
    }

    // ── clean_insights ────────────────────────────────────────────────────────

    #[test]
    fn test_clean_insights_filters_artifacts() {
        let table = Table::from_strings(
            TableKind::Insights,
            ["Insight", "Other"],
            vec![
                vec!["M-01", "x"],
                vec!["See more (12)", "x"],
                vec!["", "x"],
                vec![" M-03 ", "x"],
                vec!["M-01", "x"],
            ],
        );
        let cleaned = clean_insights(&table);
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.contains("M-01"));
        assert!(cleaned.contains("M-03"));
    }
}
