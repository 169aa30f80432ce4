use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt::Display;
use std::str::FromStr;

/// Errors raised by the repositories
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {key} already exists")]
    AlreadyExists { entity: &'static str, key: String },
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },
    #[error("{entity} {key} was changed by someone else")]
    Conflict { entity: &'static str, key: String },
    #[error("Corrupt value in column {column}: {message}")]
    Corrupt { column: &'static str, message: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Map a failed insert, turning unique-constraint violations into `AlreadyExists`
    pub fn from_insert(err: sqlx::Error, entity: &'static str, key: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::AlreadyExists {
                entity,
                key: key.to_string(),
            },
            _ => StoreError::Database(err),
        }
    }
}

/// Read a decimal persisted as TEXT
pub(crate) fn decimal_column(row: &SqliteRow, column: &'static str) -> StoreResult<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| StoreError::Corrupt {
        column,
        message: format!("{} ({})", e, raw),
    })
}

/// Read an enum persisted as its label
pub(crate) fn label_column<T>(row: &SqliteRow, column: &'static str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| StoreError::Corrupt {
        column,
        message: e.to_string(),
    })
}

/// Read a non-negative integer counter
pub(crate) fn count_column(row: &SqliteRow, column: &'static str) -> StoreResult<u32> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|e| StoreError::Corrupt {
        column,
        message: e.to_string(),
    })
}
