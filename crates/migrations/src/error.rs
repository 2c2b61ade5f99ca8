//! Error types for the migration system
//!
//! Every failure carries enough context (migration name, direction) to
//! diagnose it. Nothing is retried: migrations are not assumed to be
//! idempotent, so a failed run is rolled back and reported.

use std::path::PathBuf;
use thiserror::Error;

use crate::definitions::MigrationDirection;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The dependency graph has a cycle or references a missing migration
    #[error("Cyclic or unresolved dependency among migrations: {}", .stuck.join(", "))]
    CyclicOrUnresolvedDependency { stuck: Vec<String> },

    /// Two records share the same name
    #[error("Duplicate migration name: {0}")]
    DuplicateMigration(String),

    /// No migration name starts with the requested target
    #[error("No migration matches target '{0}'")]
    NoMatchingTarget(String),

    /// More than one migration name starts with the requested target
    #[error("Target '{target}' is ambiguous, it matches: {}", .matches.join(", "))]
    AmbiguousTarget { target: String, matches: Vec<String> },

    /// An upgrade or downgrade action failed; the run was rolled back
    #[error("Failed to {direction} migration '{migration}': {source}")]
    ActionExecution {
        migration: String,
        direction: MigrationDirection,
        #[source]
        source: anyhow::Error,
    },

    /// The database could not be reached or the ledger table could not be created
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Inserting or deleting a ledger row failed; the run was rolled back
    #[error("Failed to update ledger for migration '{migration}': {message}")]
    LedgerWrite { migration: String, message: String },

    /// Opening, committing or rolling back the transaction failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A single schema statement failed
    #[error("Statement failed: {0}")]
    Statement(String),

    /// A migration file could not be parsed
    #[error("Invalid migration file {}: {message}", .path.display())]
    InvalidMigrationFile { path: PathBuf, message: String },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MigrationError {
    /// Errors caused by user input rather than by the database or the files
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MigrationError::NoMatchingTarget(_)
                | MigrationError::AmbiguousTarget { .. }
                | MigrationError::Configuration(_)
        )
    }

    /// Name of the migration the error is attributed to, if any
    pub fn migration(&self) -> Option<&str> {
        match self {
            MigrationError::ActionExecution { migration, .. }
            | MigrationError::LedgerWrite { migration, .. } => Some(migration),
            MigrationError::DuplicateMigration(name) => Some(name),
            _ => None,
        }
    }
}
