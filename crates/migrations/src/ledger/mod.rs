//! Ledger Store - the persisted set of applied migration names
//!
//! The engine talks to the database only through these traits. Every
//! write of a run goes through one `LedgerTransaction`, so a failed run
//! leaves the ledger exactly as it found it.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::MigrationResult;
use crate::operation::SchemaExecutor;

pub mod memory;
pub mod sql;

pub use memory::MemoryLedger;
pub use sql::{Dialect, SqlLedger};

/// Read access and transaction factory for the ledger table
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Whether the ledger table exists
    async fn exists(&self) -> MigrationResult<bool>;

    /// Create the ledger table if it is absent; safe to call repeatedly
    async fn create_if_missing(&self) -> MigrationResult<()>;

    /// Names of all applied migrations; empty when the table is absent
    async fn load_applied_names(&self) -> MigrationResult<BTreeSet<String>>;

    /// Open the single transaction a migrate run executes in
    async fn begin(&self) -> MigrationResult<Box<dyn LedgerTransaction>>;
}

/// One open transaction spanning schema changes and ledger writes
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Statement executor handed to operations
    fn executor(&mut self) -> &mut dyn SchemaExecutor;

    /// Insert a ledger row; a no-op if the name is already recorded
    async fn record_applied(&mut self, name: &str) -> MigrationResult<()>;

    /// Delete a ledger row; a no-op if the name is not recorded
    async fn record_unapplied(&mut self, name: &str) -> MigrationResult<()>;

    async fn commit(self: Box<Self>) -> MigrationResult<()>;

    async fn rollback(self: Box<Self>) -> MigrationResult<()>;
}
