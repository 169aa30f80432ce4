use chrono::NaiveDate;
use shared::RuleKind;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::backend::domain::models::applied_occurrence::AppliedOccurrence;
use crate::backend::storage::connection::DbConnection;
use crate::backend::storage::error::{count_column, decimal_column, label_column, StoreError, StoreResult};

/// Idempotency store: one row per occurrence that has been applied
#[derive(Clone)]
pub struct OccurrenceRepository {
    db: DbConnection,
}

impl OccurrenceRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Fast pre-filter; the unique constraint in `create_with` is the authority
    pub async fn exists(&self, source_id: &str, kind: RuleKind) -> StoreResult<bool> {
        self.exists_with(self.db.pool(), source_id, kind).await
    }

    pub async fn exists_with<'e, E>(&self, executor: E, source_id: &str, kind: RuleKind) -> StoreResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(
            r#"
            SELECT 1 AS present
            FROM applied_occurrences
            WHERE source_id = ? AND rule_kind = ?
            "#,
        )
        .bind(source_id)
        .bind(kind.as_str())
        .fetch_optional(executor)
        .await?;

        Ok(row.is_some())
    }

    /// Insert an occurrence record. A second insert for the same
    /// `(source_id, rule_kind)` fails with `StoreError::AlreadyExists`.
    pub async fn create_with<'e, E>(&self, executor: E, occurrence: &AppliedOccurrence) -> StoreResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO applied_occurrences (id, source_id, rule_kind, rule_id, account_id, amount, booked_on,
                                             ledger_entry_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&occurrence.id)
        .bind(&occurrence.source_id)
        .bind(occurrence.rule_kind.as_str())
        .bind(&occurrence.rule_id)
        .bind(&occurrence.account_id)
        .bind(occurrence.amount.to_string())
        .bind(occurrence.booked_on)
        .bind(&occurrence.ledger_entry_id)
        .bind(&occurrence.created_at)
        .execute(executor)
        .await
        .map_err(|e| StoreError::from_insert(e, "occurrence", &occurrence.source_id))?;
        Ok(())
    }

    /// Occurrences of an account booked within `[start, end]`
    pub async fn list_for_account_between(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<AppliedOccurrence>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_id, rule_kind, rule_id, account_id, amount, booked_on, ledger_entry_id, created_at
            FROM applied_occurrences
            WHERE account_id = ? AND booked_on >= ? AND booked_on <= ?
            ORDER BY booked_on ASC, created_at ASC
            "#,
        )
        .bind(account_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_occurrence).collect()
    }

    /// Number of occurrences applied for a rule
    pub async fn count_for_rule(&self, rule_id: &str) -> StoreResult<u32> {
        let row = sqlx::query("SELECT COUNT(*) AS applied FROM applied_occurrences WHERE rule_id = ?")
            .bind(rule_id)
            .fetch_one(self.db.pool())
            .await?;

        count_column(&row, "applied")
    }
}

fn row_to_occurrence(row: &SqliteRow) -> StoreResult<AppliedOccurrence> {
    Ok(AppliedOccurrence {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        rule_kind: label_column(row, "rule_kind")?,
        rule_id: row.try_get("rule_id")?,
        account_id: row.try_get("account_id")?,
        amount: decimal_column(row, "amount")?,
        booked_on: row.try_get("booked_on")?,
        ledger_entry_id: row.try_get("ledger_entry_id")?,
        created_at: row.try_get("created_at")?,
    })
}
