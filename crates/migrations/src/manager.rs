//! Migration Manager - File system operations for migrations
//!
//! Handles creating, loading, and parsing migration files from the
//! migrations directory. Each `NNNN_slug.sql` file is one migration named
//! after its file stem:
//!
//! ```sql
//! -- Migration: 0002_users
//! -- Depends: 0001_initial
//!
//! -- Up migration
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//!
//! -- Down migration
//! DROP TABLE users;
//! ```

use chrono::Utc;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, TokenWithLocation, Tokenizer};
use std::fs;
use std::path::{Path, PathBuf};

use crate::definitions::MigrationRecord;
use crate::error::{MigrationError, MigrationResult};
use crate::graph::MigrationGraph;
use crate::operation::SqlOperation;
use crate::source::RecordSource;

/// Name of the migration written by `init`
pub const INITIAL_MIGRATION: &str = "0001_initial";

/// Migration manager for creating and loading migration files
#[derive(Debug, Clone)]
pub struct MigrationManager {
    migrations_dir: PathBuf,
}

/// Contents of one migration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationFile {
    pub dependencies: Vec<String>,
    pub up_sql: String,
    pub down_sql: String,
}

impl MigrationManager {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Create the migrations directory with an empty initial migration
    pub fn init(&self) -> MigrationResult<PathBuf> {
        if self.migrations_dir.exists() {
            return Err(MigrationError::Configuration(format!(
                "Migrations directory {} already exists",
                self.migrations_dir.display()
            )));
        }
        fs::create_dir_all(&self.migrations_dir)?;

        let path = self.migration_path(INITIAL_MIGRATION);
        fs::write(&path, render_template(INITIAL_MIGRATION, &[]))?;
        tracing::info!("Initialised {}", self.migrations_dir.display());
        Ok(path)
    }

    /// Write a new migration stub depending on the current leaf nodes
    pub fn create_migration(&self, name: &str) -> MigrationResult<PathBuf> {
        fs::create_dir_all(&self.migrations_dir)?;

        let graph = MigrationGraph::build(self.load_records()?)?;
        let next = graph
            .iter()
            .filter_map(|record| sequence_number(record.name()))
            .max()
            .unwrap_or(0)
            + 1;

        let migration_name = format!("{:04}_{}", next, slugify(name));
        let path = self.migration_path(&migration_name);
        if path.exists() {
            return Err(MigrationError::Configuration(format!(
                "Migration file {} already exists",
                path.display()
            )));
        }

        fs::write(&path, render_template(&migration_name, graph.leaf_nodes()))?;
        tracing::info!("Created migration {}", migration_name);
        Ok(path)
    }

    fn migration_path(&self, name: &str) -> PathBuf {
        self.migrations_dir.join(format!("{}.sql", name))
    }

    /// Parse a migration file into a record named after its file stem
    pub fn parse_migration_file(&self, path: &Path) -> MigrationResult<MigrationRecord> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MigrationError::InvalidMigrationFile {
                path: path.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            })?;

        let content = fs::read_to_string(path)?;
        let file = parse_migration_content(&content);

        let up = split_sql_statements(&file.up_sql);
        let down = split_sql_statements(&file.down_sql);

        let mut record = MigrationRecord::new(name).with_dependencies(file.dependencies);
        if !up.is_empty() || !down.is_empty() {
            record = record.with_operation(SqlOperation::new(up, down));
        }
        Ok(record)
    }
}

impl RecordSource for MigrationManager {
    fn load_records(&self) -> MigrationResult<Vec<MigrationRecord>> {
        if !self.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.migrations_dir)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.'));
            if !hidden && path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                records.push(self.parse_migration_file(&path)?);
            }
        }

        tracing::debug!(
            "Loaded {} migrations from {}",
            records.len(),
            self.migrations_dir.display()
        );
        Ok(records)
    }
}

/// Split a migration file into its dependency header and SQL sections
pub fn parse_migration_content(content: &str) -> MigrationFile {
    let mut file = MigrationFile::default();
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current_section = "";

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(comment) = trimmed.strip_prefix("--") {
            let comment = comment.trim();
            let lower = comment.to_lowercase();

            if let Some(deps) = strip_prefix_ignore_case(comment, "depends:") {
                file.dependencies.extend(
                    deps.split(',')
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(String::from),
                );
            } else if lower == "up" || lower.starts_with("up migration") {
                current_section = "up";
            } else if lower == "down" || lower.starts_with("down migration") {
                current_section = "down";
            }
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        match current_section {
            "up" => up_sql.push(line),
            "down" => down_sql.push(line),
            _ => {} // Before any section marker
        }
    }

    file.up_sql = up_sql.join("\n").trim().to_string();
    file.down_sql = down_sql.join("\n").trim().to_string();
    file
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

/// Split SQL into statements at top-level semicolons
///
/// Uses the sqlparser tokenizer so semicolons inside literals or quoted
/// identifiers are not treated as separators. The original statement text
/// is kept as written.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    let dialect = GenericDialect {};
    let split = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| e.to_string())
        .and_then(|tokens| {
            split_on_semicolons(sql, &tokens)
                .ok_or_else(|| "token position out of range".to_string())
        });

    match split {
        Ok(statements) => statements,
        Err(e) => {
            tracing::warn!("SQL tokenizing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        }
    }
}

fn split_on_semicolons(sql: &str, tokens: &[TokenWithLocation]) -> Option<Vec<String>> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_content = false;

    for token in tokens {
        match token.token {
            Token::SemiColon => {
                let location = &token.location;
                let end = byte_offset(sql, &line_starts, location.line, location.column)?;
                if has_content {
                    statements.push(sql[start..end].trim().to_string());
                }
                start = end + 1;
                has_content = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_content = true,
        }
    }

    if has_content {
        statements.push(sql[start..].trim().to_string());
    }
    Some(statements)
}

/// Byte offset of a 1-based line/column (columns count characters)
fn byte_offset(sql: &str, line_starts: &[usize], line: u64, column: u64) -> Option<usize> {
    let line_index = usize::try_from(line.checked_sub(1)?).ok()?;
    let column_index = usize::try_from(column.checked_sub(1)?).ok()?;
    let line_start = *line_starts.get(line_index)?;
    sql[line_start..]
        .char_indices()
        .nth(column_index)
        .map(|(offset, _)| line_start + offset)
}

/// Leading decimal sequence number of a migration name
pub fn sequence_number(name: &str) -> Option<u32> {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Lowercase snake case slug for a new migration name
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_').to_string();
    if slug.is_empty() {
        "auto".to_string()
    } else {
        slug
    }
}

/// Create migration template content
pub fn render_template(name: &str, dependencies: &[String]) -> String {
    format!(
        "-- Migration: {}\n\
         -- Depends: {}\n\
         -- Created: {}\n\n\
         -- Up migration\n\n\n\
         -- Down migration\n\n",
        name,
        dependencies.join(", "),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}
