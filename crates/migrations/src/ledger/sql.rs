//! SQL ledger store backed by sqlx's `Any` driver
//!
//! Works against SQLite, PostgreSQL and MySQL. The dialect is taken from
//! the URL scheme and only changes the table probe, the table DDL and the
//! bind placeholder style.

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use std::collections::BTreeSet;

use super::{LedgerStore, LedgerTransaction};
use crate::config::validate_table_name;
use crate::error::{MigrationError, MigrationResult};
use crate::operation::SchemaExecutor;

/// SQL dialect of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Detect the dialect from a connection URL
    pub fn from_url(url: &str) -> MigrationResult<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(MigrationError::Configuration(format!(
                "Unsupported database URL scheme '{}'",
                scheme
            ))),
        }
    }

    /// Bind placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Query returning one row when a table named by the first parameter exists
    pub fn table_exists_sql(&self) -> String {
        match self {
            Dialect::Postgres => format!(
                "SELECT 1 AS present FROM pg_tables \
                 WHERE schemaname = current_schema() AND tablename = {}",
                self.placeholder(1)
            ),
            Dialect::MySql => format!(
                "SELECT 1 AS present FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = {}",
                self.placeholder(1)
            ),
            Dialect::Sqlite => format!(
                "SELECT 1 AS present FROM sqlite_master WHERE type = 'table' AND name = {}",
                self.placeholder(1)
            ),
        }
    }

    /// DDL for the ledger table
    pub fn create_table_sql(&self, table: &str) -> String {
        let id_column = match self {
            Dialect::Postgres => "id SERIAL PRIMARY KEY",
            Dialect::MySql => "id INTEGER PRIMARY KEY AUTO_INCREMENT",
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                {},\n    \
                name VARCHAR(255) NOT NULL UNIQUE\n\
            )",
            table, id_column
        )
    }
}

/// Ledger stored in a table of the target database
#[derive(Debug, Clone)]
pub struct SqlLedger {
    pool: AnyPool,
    dialect: Dialect,
    table: String,
}

impl SqlLedger {
    /// Wrap an existing pool
    pub fn new(pool: AnyPool, dialect: Dialect, table: impl Into<String>) -> MigrationResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            pool,
            dialect,
            table,
        })
    }

    /// Connect to the database at `url`
    ///
    /// A single connection is used: a run is strictly sequential and an
    /// in-memory SQLite database only lives as long as its connection.
    pub async fn connect(url: &str, table: impl Into<String>) -> MigrationResult<Self> {
        let dialect = Dialect::from_url(url)?;
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(|e| {
                MigrationError::LedgerUnavailable(format!("Failed to connect to database: {}", e))
            })?;

        tracing::debug!("Connected to {:?} database", dialect);
        Self::new(pool, dialect, table)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl LedgerStore for SqlLedger {
    async fn exists(&self) -> MigrationResult<bool> {
        let row = sqlx::query(&self.dialect.table_exists_sql())
            .bind(self.table.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::LedgerUnavailable(format!("Failed to probe ledger table: {}", e))
            })?;
        Ok(row.is_some())
    }

    async fn create_if_missing(&self) -> MigrationResult<()> {
        if self.exists().await? {
            return Ok(());
        }

        tracing::info!("Creating ledger table {}", self.table);
        sqlx::query(&self.dialect.create_table_sql(&self.table))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::LedgerUnavailable(format!("Failed to create ledger table: {}", e))
            })?;
        Ok(())
    }

    async fn load_applied_names(&self) -> MigrationResult<BTreeSet<String>> {
        if !self.exists().await? {
            return Ok(BTreeSet::new());
        }

        let sql = format!("SELECT name FROM {} ORDER BY id", self.table);
        let rows: Vec<AnyRow> = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                MigrationError::LedgerUnavailable(format!(
                    "Failed to query applied migrations: {}",
                    e
                ))
            })?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name").map_err(|e| {
                    MigrationError::LedgerUnavailable(format!(
                        "Failed to read migration name: {}",
                        e
                    ))
                })
            })
            .collect()
    }

    async fn begin(&self) -> MigrationResult<Box<dyn LedgerTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| {
                MigrationError::Transaction(format!("Failed to start transaction: {}", e))
            })?;

        Ok(Box::new(SqlTransaction {
            tx,
            dialect: self.dialect,
            table: self.table.clone(),
        }))
    }
}

struct SqlTransaction {
    tx: Transaction<'static, Any>,
    dialect: Dialect,
    table: String,
}

impl SqlTransaction {
    async fn is_recorded(&mut self, name: &str) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "SELECT 1 AS present FROM {} WHERE name = {}",
            self.table,
            self.dialect.placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(name.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl SchemaExecutor for SqlTransaction {
    async fn execute(&mut self, statement: &str) -> MigrationResult<()> {
        tracing::debug!("Executing: {}", statement);
        sqlx::Executor::execute(&mut *self.tx, statement)
            .await
            .map_err(|e| MigrationError::Statement(format!("{}: {}", statement, e)))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for SqlTransaction {
    fn executor(&mut self) -> &mut dyn SchemaExecutor {
        self
    }

    async fn record_applied(&mut self, name: &str) -> MigrationResult<()> {
        let write_error = |e: sqlx::Error| MigrationError::LedgerWrite {
            migration: name.to_string(),
            message: e.to_string(),
        };

        if self.is_recorded(name).await.map_err(write_error)? {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (name) VALUES ({})",
            self.table,
            self.dialect.placeholder(1)
        );
        sqlx::query(&sql)
            .bind(name.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn record_unapplied(&mut self, name: &str) -> MigrationResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE name = {}",
            self.table,
            self.dialect.placeholder(1)
        );
        sqlx::query(&sql)
            .bind(name.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MigrationError::LedgerWrite {
                migration: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> MigrationResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| MigrationError::Transaction(format!("Failed to commit migrations: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> MigrationResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| {
                MigrationError::Transaction(format!("Failed to roll back migrations: {}", e))
            })
    }
}
