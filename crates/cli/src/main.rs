mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use commands::*;
use console::style;
use strata_migrations::MigrationError;

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about = "Dependency-ordered database migrations")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Database connection URL
    #[arg(long, short = 'd', global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database: Option<String>,

    /// Directory holding the migration files
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Path to a strata.yaml configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the migrations directory with an initial migration
    Init,

    /// Create a new migration depending on the current leaf migrations
    MakeMigration {
        /// Migration name, turned into a snake case slug
        #[arg(default_value = "auto")]
        name: String,
    },

    /// List migrations in execution order with their applied state
    ListMigrations,

    /// Apply or revert migrations to reach a target
    Migrate {
        /// Migration name prefix, `zero` or `latest` (default)
        #[arg(long, short)]
        target: Option<String>,

        /// Show what would run without touching the database
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    logging::init_logging(cli.global.verbose, cli.global.log_json)?;

    let config = settings::resolve(&cli.global)?;
    tracing::debug!(
        "Migrations directory {}, ledger table {}",
        config.migrations_dir.display(),
        config.migrations_table
    );

    match cli.command {
        Commands::Init => {
            migrate::init(&config)?;
        }
        Commands::MakeMigration { name } => {
            migrate::create(&config, &name)?;
        }
        Commands::ListMigrations => {
            migrate::status(&config).await?;
        }
        Commands::Migrate { target, dry_run } => {
            migrate::run(&config, target.as_deref(), dry_run).await?;
        }
    }

    Ok(())
}

/// 2 for bad input such as an unknown target, 1 for everything else
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<MigrationError>() {
        Some(migration_err) if migration_err.is_user_error() => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_with_globals() {
        let cli = Cli::try_parse_from([
            "strata",
            "migrate",
            "--target",
            "0002",
            "--dry-run",
            "--database",
            "sqlite::memory:",
            "--migrations-dir",
            "db/migrations",
        ])
        .unwrap();

        assert_eq!(cli.global.database.as_deref(), Some("sqlite::memory:"));
        assert_eq!(cli.global.migrations_dir, Some(PathBuf::from("db/migrations")));
        match cli.command {
            Commands::Migrate { target, dry_run } => {
                assert_eq!(target.as_deref(), Some("0002"));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_make_migration_default_name() {
        let cli = Cli::try_parse_from(["strata", "make-migration"]).unwrap();
        assert!(matches!(cli.command, Commands::MakeMigration { ref name } if name == "auto"));
    }

    #[test]
    fn test_exit_code_separates_user_errors() {
        let err = anyhow::Error::from(MigrationError::NoMatchingTarget("0009".to_string()));
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::from(MigrationError::Configuration("no url".to_string()))
            .context("Failed to load configuration");
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::from(MigrationError::LedgerUnavailable("refused".to_string()));
        assert_eq!(exit_code(&err), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["strata", "createdb"]).is_err());
    }
}
