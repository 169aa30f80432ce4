pub mod account;
pub mod applied_occurrence;
pub mod ledger_entry;
pub mod recurrence;
pub mod task_run;

pub use account::Account;
pub use applied_occurrence::AppliedOccurrence;
pub use ledger_entry::LedgerEntry;
pub use recurrence::{Occurrence, RecurrenceRule, RuleValidationError, Schedule};
pub use task_run::TaskRun;
