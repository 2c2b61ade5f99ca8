//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system:
//! the immutable `MigrationRecord`, the execution direction and the report
//! returned by a migrate run.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::operation::Operation;

/// A single named, reversible migration
///
/// Records are built once per run by a record source and never mutated
/// afterwards. `dependants` and `is_applied` are filled in by the graph
/// builder.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    name: String,
    dependencies: BTreeSet<String>,
    operations: Vec<Arc<dyn Operation>>,
    dependants: BTreeSet<String>,
    is_applied: bool,
}

impl MigrationRecord {
    /// Create a record with no dependencies and no operations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: BTreeSet::new(),
            operations: Vec::new(),
            dependants: BTreeSet::new(),
            is_applied: false,
        }
    }

    /// Declare the migrations this one depends on
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Append a reversible operation
    pub fn with_operation(mut self, operation: impl Operation + 'static) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    /// Append already shared operations
    pub fn with_operations(mut self, operations: Vec<Arc<dyn Operation>>) -> Self {
        self.operations.extend(operations);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    /// Names of the records that declare this one as a dependency
    pub fn dependants(&self) -> &BTreeSet<String> {
        &self.dependants
    }

    /// Whether the ledger listed this migration when the graph was built
    pub fn is_applied(&self) -> bool {
        self.is_applied
    }

    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.dependants.is_empty()
    }

    pub(crate) fn resolved(mut self, dependants: BTreeSet<String>, is_applied: bool) -> Self {
        self.dependants = dependants;
        self.is_applied = is_applied;
        self
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration
    Up,
    /// Revert the migration
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "upgrade"),
            MigrationDirection::Down => write!(f, "downgrade"),
        }
    }
}

/// Result of a migrate run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Migrations reverted, in execution order
    pub downgraded: Vec<String>,
    /// Migrations applied, in execution order
    pub upgraded: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl ExecutionReport {
    /// True when the run found nothing to do
    pub fn is_noop(&self) -> bool {
        self.downgraded.is_empty() && self.upgraded.is_empty()
    }
}
