//! Migration Plan - which migrations to revert and which to apply
//!
//! The ordered graph is cut at the target index. Applied records after the
//! cut are reverted newest first; unapplied records before it are applied
//! oldest first.

use std::collections::BTreeSet;

use crate::definitions::MigrationRecord;
use crate::graph::MigrationGraph;

/// The transitions needed to move the ledger to a target index
#[derive(Debug, Clone)]
pub struct MigrationPlan<'g> {
    downgrade: Vec<&'g MigrationRecord>,
    upgrade: Vec<&'g MigrationRecord>,
}

impl<'g> MigrationPlan<'g> {
    pub fn compute(
        graph: &'g MigrationGraph,
        applied: &BTreeSet<String>,
        target_index: usize,
    ) -> Self {
        let cut = target_index.min(graph.len());
        let (prefix, suffix) = graph.records().split_at(cut);

        let downgrade = suffix
            .iter()
            .rev()
            .filter(|record| applied.contains(record.name()))
            .collect();
        let upgrade = prefix
            .iter()
            .filter(|record| !applied.contains(record.name()))
            .collect();

        Self { downgrade, upgrade }
    }

    /// Records to revert, in execution order
    pub fn downgrade(&self) -> &[&'g MigrationRecord] {
        &self.downgrade
    }

    /// Records to apply, in execution order
    pub fn upgrade(&self) -> &[&'g MigrationRecord] {
        &self.upgrade
    }

    pub fn is_empty(&self) -> bool {
        self.downgrade.is_empty() && self.upgrade.is_empty()
    }

    pub fn downgrade_names(&self) -> Vec<String> {
        self.downgrade.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn upgrade_names(&self) -> Vec<String> {
        self.upgrade.iter().map(|r| r.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> MigrationGraph {
        MigrationGraph::build(vec![
            MigrationRecord::new("0001"),
            MigrationRecord::new("0002").with_dependencies(["0001"]),
            MigrationRecord::new("0003").with_dependencies(["0002"]),
        ])
        .unwrap()
    }

    fn applied(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_upgrade_from_empty() {
        let graph = chain();
        let plan = MigrationPlan::compute(&graph, &applied(&[]), 2);
        assert_eq!(plan.upgrade_names(), vec!["0001", "0002"]);
        assert!(plan.downgrade().is_empty());
    }

    #[test]
    fn test_downgrade_is_reverse_order() {
        let graph = chain();
        let plan = MigrationPlan::compute(&graph, &applied(&["0001", "0002", "0003"]), 0);
        assert_eq!(plan.downgrade_names(), vec!["0003", "0002", "0001"]);
        assert!(plan.upgrade().is_empty());
    }

    #[test]
    fn test_mixed_plan_fills_gaps_and_reverts_tail() {
        let graph = chain();
        // 0001 missing, 0003 applied: cut after 0002
        let plan = MigrationPlan::compute(&graph, &applied(&["0002", "0003"]), 2);
        assert_eq!(plan.downgrade_names(), vec!["0003"]);
        assert_eq!(plan.upgrade_names(), vec!["0001"]);
    }

    #[test]
    fn test_already_at_target_is_empty() {
        let graph = chain();
        let plan = MigrationPlan::compute(&graph, &applied(&["0001", "0002"]), 2);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_ledger_names_outside_graph_are_ignored() {
        let graph = chain();
        let plan = MigrationPlan::compute(&graph, &applied(&["0001", "0099_gone"]), 1);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_index_past_end_is_clamped() {
        let graph = chain();
        let plan = MigrationPlan::compute(&graph, &applied(&[]), 10);
        assert_eq!(plan.upgrade_names(), vec!["0001", "0002", "0003"]);
    }
}
