use crate::backend::storage::StoreError;

/// Why a single rule could not be applied
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The occurrence was already applied, by this run or a concurrent one
    #[error("Occurrence {source_id} was already applied")]
    Duplicate { source_id: String },
    #[error("Rule {rule_id} is in an invalid state: {reason}")]
    InvalidRuleState { rule_id: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for ProcessingError {
    fn from(err: sqlx::Error) -> Self {
        ProcessingError::Store(StoreError::Database(err))
    }
}

/// Projection input rejected before any computation
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Projection horizon must be between {min} and {max} months, got {months}")]
    MonthsOutOfRange { months: u32, min: u32, max: u32 },
    #[error("Unknown account {0}")]
    UnknownAccount(String),
    #[error("Projection from {0} runs past the supported calendar")]
    DateOutOfRange(chrono::NaiveDate),
    #[error(transparent)]
    Store(#[from] StoreError),
}
