// Stage projection: derive the grouped kanban view from the flat snapshot.
//
// Purely derived state. Columns are recomputed from scratch on every
// snapshot version bump; lead counts are bounded by one organization's
// pipeline, so a full O(n) pass beats incremental diffing on simplicity.

use leadflow_common::types::{Lead, Stage};
use rust_decimal::Decimal;

/// One pipeline column: a fixed stage, its member leads in snapshot order,
/// and the aggregate monetary value of those leads.
#[derive(Debug, Clone, PartialEq)]
pub struct StageColumn {
    pub stage: Stage,
    pub leads: Vec<Lead>,
    pub total_value: Decimal,
}

/// Project the snapshot into the six fixed stage columns, in pipeline order.
///
/// Every lead lands in exactly one column; relative order within a column
/// follows the snapshot (newest first, as supplied by the source).
pub fn project(leads: &[Lead]) -> Vec<StageColumn> {
    let mut columns: Vec<StageColumn> = Stage::ALL
        .iter()
        .map(|&stage| StageColumn { stage, leads: Vec::new(), total_value: Decimal::ZERO })
        .collect();

    for lead in leads {
        let column = columns
            .iter_mut()
            .find(|column| column.stage == lead.stage)
            .expect("Stage::ALL covers every stage variant");
        column.total_value += lead.value;
        column.leads.push(lead.clone());
    }

    columns
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use leadflow_common::types::OwnerRef;
    use uuid::Uuid;

    use super::*;

    fn lead(name: &str, stage: Stage, value: i64) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: String::new(),
            phone: String::new(),
            company: String::new(),
            value: Decimal::from(value),
            stage,
            tags: Vec::new(),
            source: "test".to_string(),
            owner: OwnerRef::Unassigned,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // ── Column layout ──────────────────────────────────────────────

    #[test]
    fn empty_snapshot_yields_six_empty_columns() {
        let columns = project(&[]);
        assert_eq!(columns.len(), 6);
        for (column, stage) in columns.iter().zip(Stage::ALL) {
            assert_eq!(column.stage, stage);
            assert!(column.leads.is_empty());
            assert_eq!(column.total_value, Decimal::ZERO);
        }
    }

    #[test]
    fn columns_follow_pipeline_order() {
        let columns = project(&[lead("a", Stage::Lost, 1)]);
        let stages: Vec<Stage> = columns.iter().map(|c| c.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
    }

    // ── Partition property ─────────────────────────────────────────

    #[test]
    fn projection_partitions_leads_disjointly() {
        let snapshot = vec![
            lead("a", Stage::New, 10),
            lead("b", Stage::Qualified, 20),
            lead("c", Stage::New, 30),
            lead("d", Stage::Won, 40),
            lead("e", Stage::Lost, 0),
        ];
        let columns = project(&snapshot);

        let total: usize = columns.iter().map(|c| c.leads.len()).sum();
        assert_eq!(total, snapshot.len(), "no lead omitted or duplicated");

        let mut seen = HashSet::new();
        for column in &columns {
            for l in &column.leads {
                assert_eq!(l.stage, column.stage);
                assert!(seen.insert(l.id), "lead {} appeared in two columns", l.id);
            }
        }
    }

    #[test]
    fn lead_absent_from_all_other_columns() {
        let l = lead("L1", Stage::Qualified, 5000);
        let id = l.id;
        let columns = project(&[l]);

        for column in &columns {
            let present = column.leads.iter().any(|lead| lead.id == id);
            assert_eq!(present, column.stage == Stage::Qualified);
        }
    }

    // ── Aggregates ─────────────────────────────────────────────────

    #[test]
    fn column_total_sums_member_values() {
        let snapshot = vec![
            lead("a", Stage::Proposal, 100),
            lead("b", Stage::Proposal, 250),
            lead("c", Stage::Won, 999),
        ];
        let columns = project(&snapshot);

        let proposal = columns.iter().find(|c| c.stage == Stage::Proposal).expect("column");
        assert_eq!(proposal.total_value, Decimal::from(350));

        let won = columns.iter().find(|c| c.stage == Stage::Won).expect("column");
        assert_eq!(won.total_value, Decimal::from(999));
    }

    #[test]
    fn zero_value_leads_contribute_nothing() {
        let columns = project(&[lead("a", Stage::New, 0), lead("b", Stage::New, 70)]);
        let new = columns.iter().find(|c| c.stage == Stage::New).expect("column");
        assert_eq!(new.leads.len(), 2);
        assert_eq!(new.total_value, Decimal::from(70));
    }

    // ── Order preservation ─────────────────────────────────────────

    #[test]
    fn snapshot_order_is_preserved_within_a_column() {
        let first = lead("first", Stage::Contacted, 1);
        let second = lead("second", Stage::Contacted, 2);
        let columns = project(&[first.clone(), lead("x", Stage::New, 0), second.clone()]);

        let contacted = columns.iter().find(|c| c.stage == Stage::Contacted).expect("column");
        assert_eq!(contacted.leads[0].id, first.id);
        assert_eq!(contacted.leads[1].id, second.id);
    }
}
