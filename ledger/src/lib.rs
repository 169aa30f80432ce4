//! Recurring-transaction scheduling, booking and projection engine for a
//! personal-finance ledger.

pub mod backend;
pub mod config;

pub use backend::{initialize_backend, AppState};
pub use config::LedgerConfig;
