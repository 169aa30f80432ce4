pub mod account_repository;
pub mod ledger_entry_repository;
pub mod occurrence_repository;
pub mod recurrence_repository;
pub mod task_run_repository;

pub use account_repository::AccountRepository;
pub use ledger_entry_repository::LedgerEntryRepository;
pub use occurrence_repository::OccurrenceRepository;
pub use recurrence_repository::{RecurrenceRepository, UnreadableRule};
pub use task_run_repository::TaskRunRepository;
