//! Configuration for the migration system
//!
//! Values are layered: defaults, then an optional `strata.yaml`, then a
//! `.env` file and the process environment. Callers apply CLI flags last.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{MigrationError, MigrationResult};

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "strata.yaml";

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_MIGRATIONS_DIR: &str = "STRATA_MIGRATIONS_DIR";
pub const ENV_MIGRATIONS_TABLE: &str = "STRATA_MIGRATIONS_TABLE";

/// Configuration for the migration system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking applied migrations
    pub migrations_table: String,
    /// Connection URL of the target database
    pub database_url: Option<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "migrations".to_string(),
            database_url: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    migrations_dir: Option<PathBuf>,
    migrations_table: Option<String>,
    database_url: Option<String>,
}

impl MigrationConfig {
    /// Load from `path` (or `strata.yaml` when present), `.env` and the environment
    pub fn load(path: Option<&Path>) -> MigrationResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };

        // A missing .env file is normal.
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("Ignoring unreadable .env file: {}", e);
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file over the defaults
    pub fn from_file(path: &Path) -> MigrationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> MigrationResult<Self> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        let defaults = Self::default();
        Ok(Self {
            migrations_dir: file.migrations_dir.unwrap_or(defaults.migrations_dir),
            migrations_table: file.migrations_table.unwrap_or(defaults.migrations_table),
            database_url: file.database_url,
        })
    }

    /// Override values from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(dir) = lookup(ENV_MIGRATIONS_DIR).filter(|v| !v.is_empty()) {
            self.migrations_dir = PathBuf::from(dir);
        }
        if let Some(table) = lookup(ENV_MIGRATIONS_TABLE).filter(|v| !v.is_empty()) {
            self.migrations_table = table;
        }
    }

    pub fn validate(&self) -> MigrationResult<()> {
        validate_table_name(&self.migrations_table)
    }

    /// The database URL, or an error telling the user how to provide one
    pub fn require_database_url(&self) -> MigrationResult<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            MigrationError::Configuration(format!(
                "{} not set. Pass --database or set it in the environment or .env",
                ENV_DATABASE_URL
            ))
        })
    }
}

/// Table names are interpolated into SQL unquoted; only lowercase
/// identifiers match what Postgres stores after case folding
pub fn validate_table_name(table: &str) -> MigrationResult<()> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(MigrationError::Configuration(format!(
            "Invalid migrations table name '{}' (lowercase letters, digits, underscores)",
            table
        )));
    }
    Ok(())
}
