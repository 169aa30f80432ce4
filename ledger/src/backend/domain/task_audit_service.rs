//! Append-only audit log of processing runs.

use anyhow::Result;
use log::info;
use std::sync::Arc;

use crate::backend::domain::commands::audit::RecordTaskRunCommand;
use crate::backend::domain::models::task_run::TaskRun;
use crate::backend::storage::{DbConnection, TaskRunRepository};

#[derive(Clone)]
pub struct TaskAuditService {
    task_run_repository: TaskRunRepository,
}

impl TaskAuditService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        let task_run_repository = TaskRunRepository::new((*db).clone());
        Self { task_run_repository }
    }

    /// Record one run. A single insert; runs are never updated afterwards.
    pub async fn record(&self, command: RecordTaskRunCommand) -> Result<TaskRun> {
        let mut run = TaskRun::new(
            command.kind,
            command.status,
            command.applied_count,
            command.duration_ms,
            command.executed_on,
        );
        run.error_message = command.error_message;
        run.details = command.details.unwrap_or_else(|| serde_json::json!({}));
        run.created_by = command.created_by;

        self.task_run_repository.store_task_run(&run).await?;
        info!(
            "Recorded task run {} ({}, {}, {} applied in {}ms)",
            run.id, run.kind, run.status, run.applied_count, run.duration_ms
        );
        Ok(run)
    }

    pub async fn get(&self, run_id: &str) -> Result<Option<TaskRun>> {
        Ok(self.task_run_repository.get_task_run(run_id).await?)
    }

    /// Most recent runs first
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<TaskRun>> {
        Ok(self.task_run_repository.list_recent(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared::{TaskKind, TaskStatus};

    async fn setup_test() -> TaskAuditService {
        let db = Arc::new(DbConnection::init_test().await.expect("Failed to init test DB"));
        TaskAuditService::new(db)
    }

    #[tokio::test]
    async fn test_record_task_run() {
        let service = setup_test().await;

        let run = service
            .record(RecordTaskRunCommand {
                kind: TaskKind::DebitBatch,
                status: TaskStatus::Error,
                applied_count: 0,
                duration_ms: 4,
                executed_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                error_message: Some("store unavailable".to_string()),
                details: None,
                created_by: Some("user::alice".to_string()),
            })
            .await
            .unwrap();

        let loaded = service.get(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(loaded.details, serde_json::json!({}));
        assert!(loaded.id.starts_with("task::debit-batch::"));
        assert_eq!(service.list_recent(5).await.unwrap().len(), 1);
    }
}
