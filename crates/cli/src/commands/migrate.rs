use anyhow::Context;
use console::style;
use strata_migrations::{
    ExecutionReport, LedgerStore, MigrationConfig, MigrationGraph, MigrationManager,
    MigrationRunner, PlannedRun, SqlLedger, Target,
};

pub fn init(config: &MigrationConfig) -> anyhow::Result<()> {
    let manager = MigrationManager::new(&config.migrations_dir);
    let path = manager.init()?;

    println!("{} {}", style("Created").green().bold(), path.display());
    Ok(())
}

pub fn create(config: &MigrationConfig, name: &str) -> anyhow::Result<()> {
    let manager = MigrationManager::new(&config.migrations_dir);
    let path = manager.create_migration(name)?;

    println!("{} {}", style("Created migration").green().bold(), path.display());
    Ok(())
}

pub async fn status(config: &MigrationConfig) -> anyhow::Result<()> {
    let runner = connect(config).await?;
    let graph = runner.status().await?;
    print_status(&graph);
    Ok(())
}

pub async fn run(
    config: &MigrationConfig,
    target: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let runner = connect(config).await?;
    let target = Target::parse(target);
    run_with(&runner, &target, dry_run).await
}

async fn connect(config: &MigrationConfig) -> anyhow::Result<MigrationRunner<SqlLedger>> {
    let url = config.require_database_url()?;
    let ledger = SqlLedger::connect(url, config.migrations_table.clone())
        .await
        .context("Could not open the migration ledger")?;
    Ok(MigrationRunner::new(
        ledger,
        MigrationManager::new(&config.migrations_dir),
    ))
}

async fn run_with<L: LedgerStore>(
    runner: &MigrationRunner<L>,
    target: &Target,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        let planned = runner.plan(target).await?;
        print_plan(&planned);
        return Ok(());
    }

    let report = runner.migrate(target).await?;
    print_report(&report);
    Ok(())
}

fn status_lines(graph: &MigrationGraph) -> Vec<String> {
    graph
        .iter()
        .map(|record| {
            let marker = if record.is_applied() { "[+]" } else { "[ ]" };
            format!("{} {}", marker, record.name())
        })
        .collect()
}

fn print_status(graph: &MigrationGraph) {
    if graph.is_empty() {
        println!("No migrations found");
        return;
    }

    for (record, line) in graph.iter().zip(status_lines(graph)) {
        if record.is_applied() {
            println!("{}", style(line).green());
        } else {
            println!("{}", style(line).dim());
        }
    }
}

fn operation_lines(planned: &PlannedRun, name: &str) -> Vec<String> {
    planned
        .operations_of(name)
        .iter()
        .map(|summary| format!("    {}", summary))
        .collect()
}

fn print_plan(planned: &PlannedRun) {
    if planned.is_empty() {
        println!("Nothing to migrate");
        return;
    }

    for name in &planned.downgrade {
        println!("{} {}", style("Would unapply").yellow(), name);
        for line in operation_lines(planned, name) {
            println!("{}", style(line).dim());
        }
    }
    for name in &planned.upgrade {
        println!("{} {}", style("Would apply").cyan(), name);
        for line in operation_lines(planned, name) {
            println!("{}", style(line).dim());
        }
    }
}

fn print_report(report: &ExecutionReport) {
    if report.is_noop() {
        println!("Nothing to migrate");
        return;
    }

    for name in &report.downgraded {
        println!("{} {}", style("Unapplied").yellow(), name);
    }
    for name in &report.upgraded {
        println!("{} {}", style("Applied").green(), name);
    }
    println!(
        "{} ({} applied, {} unapplied, {}ms)",
        style("Done").green().bold(),
        report.upgraded.len(),
        report.downgraded.len(),
        report.execution_time_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use strata_migrations::MemoryLedger;
    use tempfile::TempDir;

    fn config_for(temp_dir: &TempDir) -> MigrationConfig {
        MigrationConfig {
            migrations_dir: temp_dir.path().join("migrations"),
            database_url: Some(format!(
                "sqlite://{}?mode=rwc",
                temp_dir.path().join("app.db").display()
            )),
            ..Default::default()
        }
    }

    fn write_users_migration(config: &MigrationConfig) {
        let path = config.migrations_dir.join("0002_users.sql");
        fs::write(
            path,
            "-- Depends: 0001_initial\n\
             -- Up migration\n\
             CREATE TABLE users (id INTEGER PRIMARY KEY);\n\
             -- Down migration\n\
             DROP TABLE users;\n",
        )
        .unwrap();
    }

    #[test]
    fn test_init_refuses_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        init(&config).unwrap();
        assert!(config.migrations_dir.join("0001_initial.sql").exists());
        assert!(init(&config).is_err());
    }

    #[test]
    fn test_create_adds_next_migration() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        init(&config).unwrap();
        create(&config, "Add Users").unwrap();

        let content =
            fs::read_to_string(config.migrations_dir.join("0002_add_users.sql")).unwrap();
        assert!(content.contains("-- Depends: 0001_initial"));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_ledger_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);
        init(&config).unwrap();

        let ledger = MemoryLedger::new();
        let runner = MigrationRunner::new(
            ledger.clone(),
            MigrationManager::new(&config.migrations_dir),
        );
        run_with(&runner, &Target::Latest, true).await.unwrap();

        assert!(!ledger.table_exists().await);
        assert!(ledger.applied_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_lists_operation_summaries() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);
        init(&config).unwrap();
        write_users_migration(&config);

        let runner = MigrationRunner::new(
            MemoryLedger::new(),
            MigrationManager::new(&config.migrations_dir),
        );
        let planned = runner.plan(&Target::Latest).await.unwrap();

        assert!(operation_lines(&planned, "0001_initial").is_empty());
        assert_eq!(
            operation_lines(&planned, "0002_users"),
            vec!["    sql (1 up, 1 down statements)"]
        );
    }

    #[tokio::test]
    async fn test_migrate_and_list_against_sqlite_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);
        init(&config).unwrap();
        write_users_migration(&config);

        run(&config, None, false).await.unwrap();

        let runner = connect(&config).await.unwrap();
        let graph = runner.status().await.unwrap();
        assert_eq!(
            status_lines(&graph),
            vec!["[+] 0001_initial", "[+] 0002_users"]
        );
        drop(runner);

        run(&config, Some("0001"), false).await.unwrap();
        let graph = connect(&config).await.unwrap().status().await.unwrap();
        assert_eq!(
            status_lines(&graph),
            vec!["[+] 0001_initial", "[ ] 0002_users"]
        );
    }

    #[tokio::test]
    async fn test_missing_database_url() {
        let temp_dir = TempDir::new().unwrap();
        let config = MigrationConfig {
            migrations_dir: temp_dir.path().join("migrations"),
            ..Default::default()
        };

        let err = run(&config, None, false).await.unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn test_init_uses_relative_default_directory() {
        let temp_dir = TempDir::new().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let result = init(&MigrationConfig::default());
        let created = temp_dir.path().join("migrations").join("0001_initial.sql").exists();

        std::env::set_current_dir(original).unwrap();
        result.unwrap();
        assert!(created);
    }
}
