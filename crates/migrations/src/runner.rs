//! Migration Runner - Executes migrations against the database
//!
//! A run is one transaction: every downgrade, every upgrade and every
//! ledger write either commits together or not at all.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::definitions::{ExecutionReport, MigrationDirection, MigrationRecord};
use crate::error::{MigrationError, MigrationResult};
use crate::graph::MigrationGraph;
use crate::ledger::{LedgerStore, LedgerTransaction};
use crate::plan::MigrationPlan;
use crate::source::RecordSource;
use crate::target::Target;

/// Compute the plan for `target_index` and execute it
pub async fn migrate(
    ledger: &dyn LedgerStore,
    graph: &MigrationGraph,
    applied: &BTreeSet<String>,
    target_index: usize,
) -> MigrationResult<ExecutionReport> {
    let plan = MigrationPlan::compute(graph, applied, target_index);
    execute(ledger, &plan).await
}

/// Execute a plan inside a single transaction
///
/// An empty plan is a successful no-op and never opens a transaction.
pub async fn execute(
    ledger: &dyn LedgerStore,
    plan: &MigrationPlan<'_>,
) -> MigrationResult<ExecutionReport> {
    let start_time = Instant::now();

    if plan.is_empty() {
        tracing::info!("No migrations to apply or revert");
        return Ok(ExecutionReport {
            execution_time_ms: start_time.elapsed().as_millis(),
            ..Default::default()
        });
    }

    tracing::debug!(
        "Migration plan: downgrade {:?}, upgrade {:?}",
        plan.downgrade_names(),
        plan.upgrade_names()
    );

    let mut transaction = ledger.begin().await?;
    let outcome = run_transitions(transaction.as_mut(), plan).await;

    match outcome {
        Ok((downgraded, upgraded)) => {
            transaction.commit().await?;
            Ok(ExecutionReport {
                downgraded,
                upgraded,
                execution_time_ms: start_time.elapsed().as_millis(),
            })
        }
        Err(err) => {
            tracing::error!("Migration run failed, rolling back: {}", err);
            if let Err(rollback_err) = transaction.rollback().await {
                tracing::warn!("Explicit rollback failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

async fn run_transitions(
    transaction: &mut dyn LedgerTransaction,
    plan: &MigrationPlan<'_>,
) -> MigrationResult<(Vec<String>, Vec<String>)> {
    let mut downgraded = Vec::with_capacity(plan.downgrade().len());
    for record in plan.downgrade() {
        tracing::info!("Unapplying {}", record.name());
        apply_record(transaction, record, MigrationDirection::Down).await?;
        transaction.record_unapplied(record.name()).await?;
        downgraded.push(record.name().to_string());
    }

    let mut upgraded = Vec::with_capacity(plan.upgrade().len());
    for record in plan.upgrade() {
        tracing::info!("Applying {}", record.name());
        apply_record(transaction, record, MigrationDirection::Up).await?;
        transaction.record_applied(record.name()).await?;
        upgraded.push(record.name().to_string());
    }

    Ok((downgraded, upgraded))
}

/// Run a record's operations forward, or in reverse order when reverting
async fn apply_record(
    transaction: &mut dyn LedgerTransaction,
    record: &MigrationRecord,
    direction: MigrationDirection,
) -> MigrationResult<()> {
    let wrap = |source: anyhow::Error| MigrationError::ActionExecution {
        migration: record.name().to_string(),
        direction,
        source,
    };

    match direction {
        MigrationDirection::Up => {
            for operation in record.operations() {
                operation.upgrade(transaction.executor()).await.map_err(wrap)?;
            }
        }
        MigrationDirection::Down => {
            for operation in record.operations().iter().rev() {
                operation.downgrade(transaction.executor()).await.map_err(wrap)?;
            }
        }
    }
    Ok(())
}

/// What a migrate run would do, without touching the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRun {
    pub target_index: usize,
    pub downgrade: Vec<String>,
    pub upgrade: Vec<String>,
    /// `Operation::describe` output for every planned migration
    pub operations: BTreeMap<String, Vec<String>>,
}

impl PlannedRun {
    pub fn is_empty(&self) -> bool {
        self.downgrade.is_empty() && self.upgrade.is_empty()
    }

    /// Operation summaries of a planned migration, in declared order
    pub fn operations_of(&self, name: &str) -> &[String] {
        self.operations.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Migration runner that ties a record source to a ledger store
pub struct MigrationRunner<L: LedgerStore> {
    ledger: L,
    source: Box<dyn RecordSource>,
}

impl<L: LedgerStore> MigrationRunner<L> {
    pub fn new(ledger: L, source: impl RecordSource + 'static) -> Self {
        Self {
            ledger,
            source: Box::new(source),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Build the graph with applied flags from the current ledger
    ///
    /// Does not create the ledger table.
    pub async fn status(&self) -> MigrationResult<MigrationGraph> {
        let applied = self.ledger.load_applied_names().await?;
        MigrationGraph::build_with_applied(self.source.load_records()?, &applied)
    }

    /// Resolve `target` and compute the plan without executing it
    pub async fn plan(&self, target: &Target) -> MigrationResult<PlannedRun> {
        let applied = self.ledger.load_applied_names().await?;
        let graph = MigrationGraph::build_with_applied(self.source.load_records()?, &applied)?;
        let target_index = target.resolve(&graph)?;
        let plan = MigrationPlan::compute(&graph, &applied, target_index);

        let operations = plan
            .downgrade()
            .iter()
            .chain(plan.upgrade())
            .map(|record| {
                let summaries = record.operations().iter().map(|op| op.describe()).collect();
                (record.name().to_string(), summaries)
            })
            .collect();

        Ok(PlannedRun {
            target_index,
            downgrade: plan.downgrade_names(),
            upgrade: plan.upgrade_names(),
            operations,
        })
    }

    /// Move the database to `target`
    pub async fn migrate(&self, target: &Target) -> MigrationResult<ExecutionReport> {
        self.ledger.create_if_missing().await.map_err(|e| match e {
            MigrationError::LedgerUnavailable(_) => e,
            other => MigrationError::LedgerUnavailable(other.to_string()),
        })?;

        let applied = self.ledger.load_applied_names().await?;
        let graph = MigrationGraph::build_with_applied(self.source.load_records()?, &applied)?;

        // Target errors surface here, before any transaction is opened.
        let target_index = target.resolve(&graph)?;
        tracing::debug!("Target {} resolved to index {}", target, target_index);

        migrate(&self.ledger, &graph, &applied, target_index).await
    }
}
