use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::backend::domain::models::task_run::TaskRun;
use crate::backend::storage::connection::DbConnection;
use crate::backend::storage::error::{count_column, label_column, StoreError, StoreResult};

/// Append-only store for task audit records
#[derive(Clone)]
pub struct TaskRunRepository {
    db: DbConnection,
}

impl TaskRunRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    pub async fn store_task_run(&self, run: &TaskRun) -> StoreResult<()> {
        let duration_ms = i64::try_from(run.duration_ms).unwrap_or(i64::MAX);
        sqlx::query(
            r#"
            INSERT INTO task_runs (id, kind, status, applied_count, duration_ms, error_message, details,
                                   executed_on, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(run.kind.as_str())
        .bind(run.status.as_str())
        .bind(i64::from(run.applied_count))
        .bind(duration_ms)
        .bind(&run.error_message)
        .bind(run.details.to_string())
        .bind(run.executed_on)
        .bind(&run.created_by)
        .bind(&run.created_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| StoreError::from_insert(e, "task run", &run.id))?;
        Ok(())
    }

    pub async fn get_task_run(&self, run_id: &str) -> StoreResult<Option<TaskRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, status, applied_count, duration_ms, error_message, details, executed_on,
                   created_by, created_at
            FROM task_runs
            WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(row_to_task_run).transpose()
    }

    /// Most recent runs first
    pub async fn list_recent(&self, limit: u32) -> StoreResult<Vec<TaskRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, status, applied_count, duration_ms, error_message, details, executed_on,
                   created_by, created_at
            FROM task_runs
            ORDER BY created_at DESC, ROWID DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_task_run).collect()
    }
}

fn row_to_task_run(row: &SqliteRow) -> StoreResult<TaskRun> {
    let details: String = row.try_get("details")?;
    let duration_ms: i64 = row.try_get("duration_ms")?;

    Ok(TaskRun {
        id: row.try_get("id")?,
        kind: label_column(row, "kind")?,
        status: label_column(row, "status")?,
        applied_count: count_column(row, "applied_count")?,
        duration_ms: u64::try_from(duration_ms).map_err(|e| StoreError::Corrupt {
            column: "duration_ms",
            message: e.to_string(),
        })?,
        error_message: row.try_get("error_message")?,
        details: serde_json::from_str(&details).map_err(|e| StoreError::Corrupt {
            column: "details",
            message: e.to_string(),
        })?,
        executed_on: row.try_get("executed_on")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}
