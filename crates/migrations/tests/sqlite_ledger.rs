use sqlx::Row;
use strata_migrations::{
    Dialect, LedgerStore, LedgerTransaction, MigrationError, MigrationRecord, MigrationRegistry,
    MigrationRunner, SqlLedger, SqlOperation, Target,
};

async fn connect() -> SqlLedger {
    SqlLedger::connect("sqlite::memory:", "migrations")
        .await
        .expect("in-memory sqlite")
}

fn registry(second_up: &str) -> MigrationRegistry {
    MigrationRegistry::from_records([
        MigrationRecord::new("0001_users").with_operation(SqlOperation::new(
            vec!["CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)".to_string()],
            vec!["DROP TABLE users".to_string()],
        )),
        MigrationRecord::new("0002_posts")
            .with_dependencies(["0001_users"])
            .with_operation(SqlOperation::new(
                vec![second_up.to_string()],
                vec!["DROP TABLE posts".to_string()],
            )),
    ])
    .unwrap()
}

async fn table_names(ledger: &SqlLedger) -> Vec<String> {
    sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(ledger.pool())
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<String, _>("name"))
        .filter(|name| !name.starts_with("sqlite_"))
        .collect()
}

#[tokio::test]
async fn test_ledger_table_lifecycle() {
    let ledger = connect().await;
    assert_eq!(ledger.dialect(), Dialect::Sqlite);
    assert!(!ledger.exists().await.unwrap());
    assert!(ledger.load_applied_names().await.unwrap().is_empty());

    ledger.create_if_missing().await.unwrap();
    ledger.create_if_missing().await.unwrap();
    assert!(ledger.exists().await.unwrap());

    let mut tx = ledger.begin().await.unwrap();
    tx.record_applied("0001_users").await.unwrap();
    tx.record_applied("0001_users").await.unwrap();
    tx.record_unapplied("0009_missing").await.unwrap();
    tx.commit().await.unwrap();

    let applied: Vec<String> = ledger.load_applied_names().await.unwrap().into_iter().collect();
    assert_eq!(applied, vec!["0001_users"]);
}

#[tokio::test]
async fn test_migrate_and_revert_schema() {
    let ledger = connect().await;
    let runner = MigrationRunner::new(
        ledger.clone(),
        registry("CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL)"),
    );

    let report = runner.migrate(&Target::Latest).await.unwrap();
    assert_eq!(report.upgraded, vec!["0001_users", "0002_posts"]);
    assert_eq!(table_names(&ledger).await, vec!["migrations", "posts", "users"]);

    let report = runner.migrate(&Target::parse(Some("0001"))).await.unwrap();
    assert_eq!(report.downgraded, vec!["0002_posts"]);
    assert_eq!(table_names(&ledger).await, vec!["migrations", "users"]);

    runner.migrate(&Target::Zero).await.unwrap();
    assert_eq!(table_names(&ledger).await, vec!["migrations"]);
    assert!(ledger.load_applied_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_statement_rolls_back_schema_and_ledger() {
    let ledger = connect().await;
    let runner = MigrationRunner::new(ledger.clone(), registry("CREATE TABLE posts (id INTEGER"));

    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::ActionExecution { ref migration, .. } if migration == "0002_posts"
    ));

    // users was created in the same transaction and must be gone again
    assert_eq!(table_names(&ledger).await, vec!["migrations"]);
    assert!(ledger.load_applied_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_rejects_unknown_scheme() {
    assert!(matches!(
        SqlLedger::connect("oracle://localhost/app", "migrations").await,
        Err(MigrationError::Configuration(_))
    ));
    assert!(matches!(
        SqlLedger::connect("sqlite::memory:", "bad table").await,
        Err(MigrationError::Configuration(_))
    ));
    assert!(matches!(
        SqlLedger::connect("sqlite::memory:", "SchemaLedger").await,
        Err(MigrationError::Configuration(_))
    ));
}
