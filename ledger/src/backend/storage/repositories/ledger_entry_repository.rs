use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::backend::domain::models::ledger_entry::LedgerEntry;
use crate::backend::storage::connection::DbConnection;
use crate::backend::storage::error::{decimal_column, label_column, StoreError, StoreResult};

/// Repository for booked ledger entries
#[derive(Clone)]
pub struct LedgerEntryRepository {
    db: DbConnection,
}

impl LedgerEntryRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Append an entry. Callers update the account balance in the same transaction.
    pub async fn store_entry_with<'e, E>(&self, executor: E, entry: &LedgerEntry) -> StoreResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, account_id, amount, description, booked_on, provenance, rule_id,
                                        created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.account_id)
        .bind(entry.amount.to_string())
        .bind(&entry.description)
        .bind(entry.booked_on)
        .bind(entry.provenance.as_str())
        .bind(&entry.rule_id)
        .bind(&entry.created_by)
        .bind(&entry.created_at)
        .execute(executor)
        .await
        .map_err(|e| StoreError::from_insert(e, "ledger entry", &entry.id))?;
        Ok(())
    }

    pub async fn get_entry(&self, entry_id: &str) -> StoreResult<Option<LedgerEntry>> {
        self.get_entry_with(self.db.pool(), entry_id).await
    }

    pub async fn get_entry_with<'e, E>(&self, executor: E, entry_id: &str) -> StoreResult<Option<LedgerEntry>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, amount, description, booked_on, provenance, rule_id, created_by, created_at
            FROM ledger_entries
            WHERE id = ?
            "#,
        )
        .bind(entry_id)
        .fetch_optional(executor)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    /// Remove an entry, returning whether a row was deleted
    pub async fn delete_entry_with<'e, E>(&self, executor: E, entry_id: &str) -> StoreResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM ledger_entries WHERE id = ?")
            .bind(entry_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List every entry of an account in booking order
    pub async fn list_entries(&self, account_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, description, booked_on, provenance, rule_id, created_by, created_at
            FROM ledger_entries
            WHERE account_id = ?
            ORDER BY booked_on ASC, ROWID ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &SqliteRow) -> StoreResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: decimal_column(row, "amount")?,
        description: row.try_get("description")?,
        booked_on: row.try_get("booked_on")?,
        provenance: label_column(row, "provenance")?,
        rule_id: row.try_get("rule_id")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}
