//! # Backend Module
//!
//! Orchestration layer of the ledger engine:
//! - **Domain**: scheduling, booking and projection logic
//! - **Storage**: SQLite persistence
//!
//! There is no transport layer here. Callers (the bundled CLI or an embedding
//! application) build an [`AppState`] and call the services directly.

pub mod domain;
pub mod storage;

use anyhow::Result;
use log::info;
use std::sync::Arc;

use crate::backend::domain::{
    AccountService, BalanceService, BudgetSummaryService, Clock, ProjectionService, RecurrenceService,
    SystemClock, TaskAuditService, TransactionProcessor,
};
use crate::backend::storage::DbConnection;
use crate::config::LedgerConfig;

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub account_service: AccountService,
    pub recurrence_service: RecurrenceService,
    pub transaction_processor: TransactionProcessor,
    pub projection_service: ProjectionService,
    pub task_audit_service: TaskAuditService,
    pub budget_summary_service: BudgetSummaryService,
    pub balance_service: BalanceService,
}

impl AppState {
    /// Wire every service onto one database handle and clock
    pub fn new(db: Arc<DbConnection>, clock: Arc<dyn Clock>) -> Self {
        Self {
            account_service: AccountService::new(db.clone()),
            recurrence_service: RecurrenceService::new(db.clone()),
            transaction_processor: TransactionProcessor::new(db.clone(), clock.clone()),
            projection_service: ProjectionService::new(db.clone()),
            task_audit_service: TaskAuditService::new(db.clone()),
            budget_summary_service: BudgetSummaryService::new(db.clone(), clock),
            balance_service: BalanceService::new(db),
        }
    }
}

/// Initialize the backend with all required services
pub async fn initialize_backend(config: &LedgerConfig) -> Result<AppState> {
    info!("Setting up database");
    let db = Arc::new(DbConnection::init(config).await?);

    info!("Setting up domain services");
    Ok(AppState::new(db, Arc::new(SystemClock)))
}
