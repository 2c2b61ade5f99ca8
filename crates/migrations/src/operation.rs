//! Reversible schema operations
//!
//! The engine treats operations as opaque: it only calls `upgrade` and
//! `downgrade` with the executor of the transaction that wraps the run.

use async_trait::async_trait;
use std::fmt;

use crate::error::MigrationResult;

/// Executes schema statements inside the ambient migration transaction
#[async_trait]
pub trait SchemaExecutor: Send {
    async fn execute(&mut self, statement: &str) -> MigrationResult<()>;
}

/// A reversible schema action
#[async_trait]
pub trait Operation: fmt::Debug + Send + Sync {
    async fn upgrade(&self, executor: &mut dyn SchemaExecutor) -> anyhow::Result<()>;

    async fn downgrade(&self, executor: &mut dyn SchemaExecutor) -> anyhow::Result<()>;

    /// Short human readable summary, used in dry runs
    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// Raw SQL statements run forward on upgrade and the `down` set on downgrade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlOperation {
    up: Vec<String>,
    down: Vec<String>,
}

impl SqlOperation {
    pub fn new(up: Vec<String>, down: Vec<String>) -> Self {
        Self { up, down }
    }

    pub fn up(&self) -> &[String] {
        &self.up
    }

    pub fn down(&self) -> &[String] {
        &self.down
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    async fn run(statements: &[String], executor: &mut dyn SchemaExecutor) -> anyhow::Result<()> {
        for statement in statements {
            executor.execute(statement).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Operation for SqlOperation {
    async fn upgrade(&self, executor: &mut dyn SchemaExecutor) -> anyhow::Result<()> {
        Self::run(&self.up, executor).await
    }

    async fn downgrade(&self, executor: &mut dyn SchemaExecutor) -> anyhow::Result<()> {
        Self::run(&self.down, executor).await
    }

    fn describe(&self) -> String {
        format!(
            "sql ({} up, {} down statements)",
            self.up.len(),
            self.down.len()
        )
    }
}
