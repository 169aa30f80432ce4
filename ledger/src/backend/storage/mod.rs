//! # Storage Module
//!
//! SQLite persistence for the ledger engine.
//!
//! One repository per table, each holding a cloned [`DbConnection`]. Methods
//! with a `_with` suffix take any SQLite executor so they can run inside the
//! transaction that applies a single occurrence.

pub mod connection;
pub mod error;
pub mod repositories;

pub use connection::DbConnection;
pub use error::{StoreError, StoreResult};
pub use repositories::{
    AccountRepository, LedgerEntryRepository, OccurrenceRepository, RecurrenceRepository, TaskRunRepository,
    UnreadableRule,
};
