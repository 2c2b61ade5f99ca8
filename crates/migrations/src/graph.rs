//! Dependency Graph Builder
//!
//! Turns a set of migration records into a validated DAG with a
//! deterministic linear order. Ordering is Kahn's algorithm where every
//! tie is broken by sorting names lexicographically, so the result never
//! depends on the enumeration order of the input.

use std::collections::{BTreeMap, BTreeSet};

use crate::definitions::MigrationRecord;
use crate::error::{MigrationError, MigrationResult};

/// Migrations in topological order, rebuilt fresh on every run
#[derive(Debug, Clone, Default)]
pub struct MigrationGraph {
    records: Vec<MigrationRecord>,
    leaf_nodes: Vec<String>,
}

impl MigrationGraph {
    /// Build a graph where nothing is applied yet
    pub fn build(records: Vec<MigrationRecord>) -> MigrationResult<Self> {
        Self::build_with_applied(records, &BTreeSet::new())
    }

    /// Build a graph and mark the records present in the ledger as applied
    pub fn build_with_applied(
        records: Vec<MigrationRecord>,
        applied: &BTreeSet<String>,
    ) -> MigrationResult<Self> {
        let mut by_name: BTreeMap<String, MigrationRecord> = BTreeMap::new();
        for record in records {
            let name = record.name().to_string();
            if by_name.insert(name.clone(), record).is_some() {
                return Err(MigrationError::DuplicateMigration(name));
            }
        }

        let dependencies: BTreeMap<String, BTreeSet<String>> = by_name
            .iter()
            .map(|(name, record)| (name.clone(), record.dependencies().clone()))
            .collect();
        let mut dependants = build_dependants(&dependencies);
        let (ordered, leaf_nodes) = order_dependencies(&dependencies, &dependants)?;

        let records = ordered
            .into_iter()
            .filter_map(|name| {
                let record = by_name.remove(&name)?;
                let record_dependants = dependants.remove(&name).unwrap_or_default();
                let is_applied = applied.contains(&name);
                Some(record.resolved(record_dependants, is_applied))
            })
            .collect();

        tracing::debug!("Built migration graph with leaf nodes {:?}", leaf_nodes);

        Ok(Self {
            records,
            leaf_nodes,
        })
    }

    /// Records in topological order
    pub fn records(&self) -> &[MigrationRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationRecord> {
        self.records.iter()
    }

    /// Names in topological order
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(MigrationRecord::name).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Names nothing depends on, sorted; the default dependencies of a new migration
    pub fn leaf_nodes(&self) -> &[String] {
        &self.leaf_nodes
    }

    pub fn get(&self, name: &str) -> Option<&MigrationRecord> {
        self.records.iter().find(|record| record.name() == name)
    }

    /// Zero-based position of a migration in the order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|record| record.name() == name)
    }
}

/// Reverse the dependency relation
///
/// Every known name gets an entry, so records nothing depends on still have
/// an empty set. Dependencies on unknown names are left out here and caught
/// by the ordering pass.
pub fn build_dependants(
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut dependants: BTreeMap<String, BTreeSet<String>> = dependencies
        .keys()
        .map(|name| (name.clone(), BTreeSet::new()))
        .collect();

    for (child, parents) in dependencies {
        for parent in parents {
            if let Some(children) = dependants.get_mut(parent) {
                children.insert(child.clone());
            }
        }
    }

    dependants
}

/// Order names so each one comes after all of its dependencies
///
/// Returns the ordered names and the sorted leaf nodes.
pub fn order_dependencies(
    dependencies: &BTreeMap<String, BTreeSet<String>>,
    dependants: &BTreeMap<String, BTreeSet<String>>,
) -> MigrationResult<(Vec<String>, Vec<String>)> {
    // BTreeMap iteration is sorted, so both lists come out in lexical order.
    let roots: Vec<String> = dependencies
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(name, _)| name.clone())
        .collect();
    let leaf_nodes: Vec<String> = dependants
        .iter()
        .filter(|(_, children)| children.is_empty())
        .map(|(name, _)| name.clone())
        .collect();

    let mut ordered = roots.clone();
    let mut seen: BTreeSet<String> = roots.iter().cloned().collect();
    let mut frontier: BTreeSet<String> = roots
        .iter()
        .filter_map(|name| dependants.get(name))
        .flatten()
        .cloned()
        .collect();

    while !frontier.is_empty() {
        let next = frontier
            .iter()
            .find(|name| {
                dependencies
                    .get(*name)
                    .map_or(false, |deps| deps.is_subset(&seen))
            })
            .cloned();

        let Some(node) = next else {
            return Err(MigrationError::CyclicOrUnresolvedDependency {
                stuck: frontier.into_iter().collect(),
            });
        };

        frontier.remove(&node);
        if let Some(children) = dependants.get(&node) {
            frontier.extend(children.iter().filter(|c| !seen.contains(*c)).cloned());
        }
        seen.insert(node.clone());
        ordered.push(node);
    }

    // Cycles with no path from a root, or records whose dependencies do not
    // exist, never reach the frontier.
    if ordered.len() < dependencies.len() {
        let stuck = dependencies
            .keys()
            .filter(|name| !seen.contains(*name))
            .cloned()
            .collect();
        return Err(MigrationError::CyclicOrUnresolvedDependency { stuck });
    }

    Ok((ordered, leaf_nodes))
}
