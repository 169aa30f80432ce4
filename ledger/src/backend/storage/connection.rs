use anyhow::Result;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LedgerConfig;

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection with default pool settings
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_options(url, 5, Duration::from_millis(5_000)).await
    }

    /// Create a new database connection with explicit pool settings
    pub async fn with_options(url: &str, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::setup_schema(&pool).await?;
        info!("Connected to ledger database at {}", url);

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize the database described by the configuration
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        Self::with_options(&config.database_url, config.max_connections, config.busy_timeout).await
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        // Generate a unique database name for tests
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::with_options(&db_url, 1, Duration::from_millis(5_000)).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                opening_balance TEXT NOT NULL,
                balance TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_accounts_owner_id
            ON accounts(owner_id);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recurrence_rules (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('debit', 'income')),
                amount TEXT NOT NULL,
                description TEXT NOT NULL,
                frequency TEXT NOT NULL,
                scheduled_date TEXT NOT NULL,
                end_date TEXT,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                income_type TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts (id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Due-rule lookup used by every batch
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_recurrence_rules_due
            ON recurrence_rules(active, scheduled_date);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_recurrence_rules_account_id
            ON recurrence_rules(account_id);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_entries (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                description TEXT NOT NULL,
                booked_on TEXT NOT NULL,
                provenance TEXT NOT NULL,
                rule_id TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (account_id) REFERENCES accounts (id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ledger_entries_account_id
            ON ledger_entries(account_id, booked_on);
            "#,
        )
        .execute(pool)
        .await?;

        // The unique key is what makes an occurrence applicable at most once
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS applied_occurrences (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                rule_kind TEXT NOT NULL,
                rule_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                booked_on TEXT NOT NULL,
                ledger_entry_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (source_id, rule_kind),
                FOREIGN KEY (account_id) REFERENCES accounts (id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_applied_occurrences_account
            ON applied_occurrences(account_id, booked_on);
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_runs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                applied_count INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                error_message TEXT,
                details TEXT NOT NULL,
                executed_on TEXT NOT NULL,
                created_by TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_task_runs_created_at
            ON task_runs(created_at DESC);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}
