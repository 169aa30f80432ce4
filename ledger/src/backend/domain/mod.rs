//! # Domain Module
//!
//! Business logic of the recurring-transaction engine.
//!
//! - **transaction_processor**: applies due rules exactly once per occurrence
//! - **projection_service**: read-only simulation of future balances
//! - **task_audit_service**: append-only record of processing runs
//! - **recurrence_service**: rule management
//! - **account_service**: accounts and manual ledger entries
//! - **budget_summary_service**: monthly equivalents, upcoming and applied occurrences
//! - **balance_service**: ledger/balance consistency checks
//!
//! Services are constructed with an explicit database handle and, where dates
//! matter, an injected [`Clock`].

pub mod account_service;
pub mod balance_service;
pub mod budget_summary_service;
pub mod clock;
pub mod commands;
pub mod errors;
pub mod models;
pub mod projection_service;
pub mod recurrence_service;
pub mod task_audit_service;
pub mod transaction_processor;

pub use account_service::*;
pub use balance_service::*;
pub use budget_summary_service::*;
pub use clock::*;
pub use errors::*;
pub use projection_service::*;
pub use recurrence_service::*;
pub use task_audit_service::*;
pub use transaction_processor::*;
