//! In-memory ledger store
//!
//! Keeps the ledger and the executed statements in process memory. A
//! transaction works on a private copy which replaces the shared state only
//! on commit, so rollback semantics match a real database.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{LedgerStore, LedgerTransaction};
use crate::error::{MigrationError, MigrationResult};
use crate::operation::SchemaExecutor;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    table_exists: bool,
    applied: BTreeSet<String>,
    executed: Vec<String>,
}

/// Ledger held in memory, cheap to clone and share between tests and runs
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    fail_on: Arc<Vec<String>>,
    unavailable: bool,
}

impl MemoryLedger {
    /// An empty database without a ledger table
    pub fn new() -> Self {
        Self::default()
    }

    /// A database whose ledger table already lists `names`
    pub fn with_applied<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = LedgerState {
            table_exists: true,
            applied: names.into_iter().map(Into::into).collect(),
            executed: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            ..Self::default()
        }
    }

    /// Make every statement containing `fragment` fail
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.fail_on).push(fragment.into());
        self
    }

    /// Simulate an unreachable database
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub async fn applied_names(&self) -> BTreeSet<String> {
        self.state.lock().await.applied.clone()
    }

    /// Statements committed so far, in execution order
    pub async fn executed_statements(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }

    pub async fn table_exists(&self) -> bool {
        self.state.lock().await.table_exists
    }

    fn check_available(&self) -> MigrationResult<()> {
        if self.unavailable {
            return Err(MigrationError::LedgerUnavailable(
                "in-memory database marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn exists(&self) -> MigrationResult<bool> {
        self.check_available()?;
        Ok(self.state.lock().await.table_exists)
    }

    async fn create_if_missing(&self) -> MigrationResult<()> {
        self.check_available()?;
        self.state.lock().await.table_exists = true;
        Ok(())
    }

    async fn load_applied_names(&self) -> MigrationResult<BTreeSet<String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        if !state.table_exists {
            return Ok(BTreeSet::new());
        }
        Ok(state.applied.clone())
    }

    async fn begin(&self) -> MigrationResult<Box<dyn LedgerTransaction>> {
        self.check_available()?;
        let working = self.state.lock().await.clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.state),
            working,
            fail_on: Arc::clone(&self.fail_on),
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<Mutex<LedgerState>>,
    working: LedgerState,
    fail_on: Arc<Vec<String>>,
}

impl MemoryTransaction {
    fn ensure_table(&self, name: &str) -> MigrationResult<()> {
        if !self.working.table_exists {
            return Err(MigrationError::LedgerWrite {
                migration: name.to_string(),
                message: "ledger table does not exist".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaExecutor for MemoryTransaction {
    async fn execute(&mut self, statement: &str) -> MigrationResult<()> {
        if self.fail_on.iter().any(|fragment| statement.contains(fragment.as_str())) {
            return Err(MigrationError::Statement(format!(
                "injected failure for statement: {}",
                statement
            )));
        }
        self.working.executed.push(statement.to_string());
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    fn executor(&mut self) -> &mut dyn SchemaExecutor {
        self
    }

    async fn record_applied(&mut self, name: &str) -> MigrationResult<()> {
        self.ensure_table(name)?;
        self.working.applied.insert(name.to_string());
        Ok(())
    }

    async fn record_unapplied(&mut self, name: &str) -> MigrationResult<()> {
        self.ensure_table(name)?;
        self.working.applied.remove(name);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MigrationResult<()> {
        let MemoryTransaction {
            shared, working, ..
        } = *self;
        *shared.lock().await = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrationResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_table_created_lazily() {
        let ledger = MemoryLedger::new();
        assert!(!ledger.exists().await.unwrap());
        assert!(ledger.load_applied_names().await.unwrap().is_empty());

        ledger.create_if_missing().await.unwrap();
        ledger.create_if_missing().await.unwrap();
        assert!(ledger.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_publishes_working_copy() {
        let ledger = MemoryLedger::with_applied(["0001"]);
        let mut tx = ledger.begin().await.unwrap();
        tx.executor().execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        tx.record_applied("0002").await.unwrap();
        tx.record_applied("0002").await.unwrap();
        tx.record_unapplied("0001").await.unwrap();
        tx.record_unapplied("0001").await.unwrap();

        // not visible before commit
        assert_eq!(ledger.applied_names().await.len(), 1);
        tx.commit().await.unwrap();

        let applied: Vec<String> = ledger.applied_names().await.into_iter().collect();
        assert_eq!(applied, vec!["0002"]);
        assert_eq!(ledger.executed_statements().await, vec!["CREATE TABLE t (id INTEGER)"]);
    }

    #[tokio::test]
    async fn test_rollback_discards_everything() {
        let ledger = MemoryLedger::with_applied(["0001"]);
        let mut tx = ledger.begin().await.unwrap();
        tx.executor().execute("DROP TABLE t").await.unwrap();
        tx.record_unapplied("0001").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(ledger.applied_names().await.contains("0001"));
        assert!(ledger.executed_statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection_and_unavailable() {
        let ledger = MemoryLedger::with_applied(Vec::<String>::new()).fail_on("BOOM");
        let mut tx = ledger.begin().await.unwrap();
        assert!(tx.executor().execute("SELECT BOOM").await.is_err());
        assert!(tx.executor().execute("SELECT 1").await.is_ok());

        let down = MemoryLedger::new().unavailable();
        assert!(matches!(
            down.create_if_missing().await,
            Err(MigrationError::LedgerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_write_without_table_fails() {
        let ledger = MemoryLedger::new();
        let mut tx = ledger.begin().await.unwrap();
        assert!(matches!(
            tx.record_applied("0001").await,
            Err(MigrationError::LedgerWrite { .. })
        ));
    }
}
