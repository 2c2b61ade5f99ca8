//! # strata-migrations: Dependency-ordered database migrations
//!
//! Migrations declare which other migrations they depend on. The crate
//! orders them into one deterministic sequence, resolves a user supplied
//! target against that sequence and moves the database there inside a
//! single transaction, keeping a ledger table of applied migrations.

pub mod config;
pub mod definitions;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod manager;
pub mod operation;
pub mod plan;
pub mod runner;
pub mod source;
pub mod target;

// Re-export core types
pub use config::*;
pub use definitions::*;
pub use error::*;
pub use graph::*;
pub use ledger::{Dialect, LedgerStore, LedgerTransaction, MemoryLedger, SqlLedger};
pub use manager::*;
pub use operation::*;
pub use plan::*;
pub use runner::{execute, migrate, MigrationRunner, PlannedRun};
pub use source::*;
pub use target::{resolve as resolve_target, Target};
