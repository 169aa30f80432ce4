use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::backend::domain::models::recurrence::RecurrenceRule;
use crate::backend::storage::connection::DbConnection;
use crate::backend::storage::error::{decimal_column, label_column, StoreError, StoreResult};

const RULE_COLUMNS: &str = "id, account_id, kind, amount, description, frequency, scheduled_date, end_date, \
                            active, income_type, created_by, created_at, updated_at";

/// A stored rule row that could not be decoded
#[derive(Debug)]
pub struct UnreadableRule {
    pub rule_id: String,
    pub error: StoreError,
}

/// Repository for recurrence rules
#[derive(Clone)]
pub struct RecurrenceRepository {
    db: DbConnection,
}

impl RecurrenceRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Store a new rule
    pub async fn store_rule(&self, rule: &RecurrenceRule) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recurrence_rules (id, account_id, kind, amount, description, frequency, scheduled_date,
                                          end_date, active, income_type, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.account_id)
        .bind(rule.kind.as_str())
        .bind(rule.amount.to_string())
        .bind(&rule.description)
        .bind(rule.frequency.as_str())
        .bind(rule.scheduled_date)
        .bind(rule.end_date)
        .bind(rule.active)
        .bind(&rule.income_type)
        .bind(&rule.created_by)
        .bind(&rule.created_at)
        .bind(&rule.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| StoreError::from_insert(e, "rule", &rule.id))?;
        Ok(())
    }

    /// Overwrite the editable fields of a rule.
    ///
    /// Compare-and-set on the schedule pointer: fails with `Conflict` when the
    /// stored pointer is no longer `expected_scheduled_date`.
    pub async fn update_rule(&self, rule: &RecurrenceRule, expected_scheduled_date: NaiveDate) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE recurrence_rules
            SET amount = ?, description = ?, frequency = ?, scheduled_date = ?, end_date = ?,
                active = ?, income_type = ?, updated_at = ?
            WHERE id = ? AND scheduled_date = ?
            "#,
        )
        .bind(rule.amount.to_string())
        .bind(&rule.description)
        .bind(rule.frequency.as_str())
        .bind(rule.scheduled_date)
        .bind(rule.end_date)
        .bind(rule.active)
        .bind(&rule.income_type)
        .bind(&rule.updated_at)
        .bind(&rule.id)
        .bind(expected_scheduled_date)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM recurrence_rules WHERE id = ?")
                .bind(&rule.id)
                .fetch_optional(self.db.pool())
                .await?
                .is_some();
            let key = rule.id.clone();
            return Err(if exists {
                StoreError::Conflict { entity: "rule", key }
            } else {
                StoreError::NotFound { entity: "rule", key }
            });
        }
        Ok(())
    }

    /// Get a rule by ID
    pub async fn get_rule(&self, rule_id: &str) -> StoreResult<Option<RecurrenceRule>> {
        let row = sqlx::query(&format!("SELECT {} FROM recurrence_rules WHERE id = ?", RULE_COLUMNS))
            .bind(rule_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(row_to_rule).transpose()
    }

    /// List every rule of an account, retired ones included
    pub async fn list_rules_for_account(&self, account_id: &str) -> StoreResult<Vec<RecurrenceRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM recurrence_rules WHERE account_id = ? ORDER BY scheduled_date ASC, id ASC",
            RULE_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    /// List the active rules of an account
    pub async fn list_active_rules_for_account(&self, account_id: &str) -> StoreResult<Vec<RecurrenceRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM recurrence_rules WHERE account_id = ? AND active = 1 ORDER BY scheduled_date ASC, id ASC",
            RULE_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    /// Active rules whose next occurrence is on or before `as_of` and that
    /// have not expired. The end date is inclusive.
    ///
    /// Rows are decoded one by one so a single unreadable rule is reported
    /// next to the others instead of failing the whole listing.
    pub async fn list_due_rules(&self, as_of: NaiveDate) -> StoreResult<Vec<Result<RecurrenceRule, UnreadableRule>>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM recurrence_rules
            WHERE active = 1
              AND scheduled_date <= ?
              AND (end_date IS NULL OR end_date >= ?)
            ORDER BY scheduled_date ASC, id ASC
            "#,
            RULE_COLUMNS
        ))
        .bind(as_of)
        .bind(as_of)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                row_to_rule(row).map_err(|error| UnreadableRule {
                    rule_id: row.try_get("id").unwrap_or_else(|_| "<unreadable id>".to_string()),
                    error,
                })
            })
            .collect())
    }

    /// Move the schedule pointer of a rule from `from` to `next`, or retire the
    /// rule when there is no next occurrence.
    ///
    /// Compare-and-set on the current pointer: returns `false` when the rule no
    /// longer points at `from`, in which case nothing was written.
    pub async fn advance_schedule_with<'e, E>(
        &self,
        executor: E,
        rule_id: &str,
        from: NaiveDate,
        next: Option<NaiveDate>,
    ) -> StoreResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().to_rfc3339();
        let result = match next {
            Some(next) => {
                sqlx::query(
                    r#"
                    UPDATE recurrence_rules
                    SET scheduled_date = ?, updated_at = ?
                    WHERE id = ? AND scheduled_date = ? AND ? > scheduled_date
                    "#,
                )
                .bind(next)
                .bind(&now)
                .bind(rule_id)
                .bind(from)
                .bind(next)
                .execute(executor)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE recurrence_rules
                    SET active = 0, updated_at = ?
                    WHERE id = ? AND scheduled_date = ?
                    "#,
                )
                .bind(&now)
                .bind(rule_id)
                .bind(from)
                .execute(executor)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    /// Activate or retire a rule without touching its schedule
    pub async fn set_active(&self, rule_id: &str, active: bool) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE recurrence_rules
            SET active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(active)
        .bind(Utc::now().to_rfc3339())
        .bind(rule_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "rule",
                key: rule_id.to_string(),
            });
        }
        Ok(())
    }
}

fn row_to_rule(row: &SqliteRow) -> StoreResult<RecurrenceRule> {
    Ok(RecurrenceRule {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        kind: label_column(row, "kind")?,
        amount: decimal_column(row, "amount")?,
        description: row.try_get("description")?,
        frequency: label_column(row, "frequency")?,
        scheduled_date: row.try_get("scheduled_date")?,
        end_date: row.try_get("end_date")?,
        active: row.try_get("active")?,
        income_type: row.try_get("income_type")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
