use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{TaskKind, TaskStatus};

/// Audit record of one processing run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub applied_count: u32,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    /// Free-form structured details (per-kind counts, failures, trigger)
    pub details: serde_json::Value,
    /// Date the run processed rules for
    pub executed_on: NaiveDate,
    pub created_by: Option<String>,
    pub created_at: String,
}

impl TaskRun {
    /// Generate a task run ID in format "task::<kind>::<uuid>"
    pub fn generate_id(kind: TaskKind) -> String {
        format!("task::{}::{}", kind, uuid::Uuid::new_v4())
    }

    pub fn new(kind: TaskKind, status: TaskStatus, applied_count: u32, duration_ms: u64, executed_on: NaiveDate) -> Self {
        Self {
            id: Self::generate_id(kind),
            kind,
            status,
            applied_count,
            duration_ms,
            error_message: None,
            details: serde_json::Value::Null,
            executed_on,
            created_by: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
