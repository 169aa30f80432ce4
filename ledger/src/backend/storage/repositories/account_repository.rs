use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::backend::domain::models::account::Account;
use crate::backend::storage::connection::DbConnection;
use crate::backend::storage::error::{decimal_column, StoreError, StoreResult};

/// Repository for accounts and their running balance
#[derive(Clone)]
pub struct AccountRepository {
    db: DbConnection,
}

impl AccountRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Store a new account
    pub async fn store_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, owner_id, name, opening_balance, balance, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.owner_id)
        .bind(&account.name)
        .bind(account.opening_balance.to_string())
        .bind(account.balance.to_string())
        .bind(&account.created_at)
        .bind(&account.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| StoreError::from_insert(e, "account", &account.id))?;
        Ok(())
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> StoreResult<Option<Account>> {
        self.get_account_with(self.db.pool(), account_id).await
    }

    /// Get an account by ID through the given executor
    pub async fn get_account_with<'e, E>(&self, executor: E, account_id: &str) -> StoreResult<Option<Account>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, name, opening_balance, balance, created_at, updated_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(executor)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Overwrite the stored balance. Only called inside a unit of work that
    /// also books the ledger entry explaining the change.
    pub async fn update_balance_with<'e, E>(&self, executor: E, account_id: &str, balance: Decimal) -> StoreResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(balance.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(account_id)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "account",
                key: account_id.to_string(),
            });
        }
        Ok(())
    }

    /// List the accounts belonging to an owner
    pub async fn list_accounts_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, name, opening_balance, balance, created_at, updated_at
            FROM accounts
            WHERE owner_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_account).collect()
    }
}

fn row_to_account(row: &SqliteRow) -> StoreResult<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        opening_balance: decimal_column(row, "opening_balance")?,
        balance: decimal_column(row, "balance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
