//! Domain-level command types.
//! Callers (the CLI, or an embedding application) map their own inputs to these.

pub mod accounts {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    /// Input for opening a new account.
    #[derive(Debug, Clone)]
    pub struct OpenAccountCommand {
        pub owner_id: String,
        pub name: String,
        pub opening_balance: Decimal,
    }

    /// Input for booking a manual ledger entry.
    #[derive(Debug, Clone)]
    pub struct ManualEntryCommand {
        pub account_id: String,
        /// Signed amount: negative for spending
        pub amount: Decimal,
        pub description: String,
        pub booked_on: NaiveDate,
        pub created_by: Option<String>,
    }
}

pub mod rules {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use shared::{Frequency, RuleKind};

    /// Input for creating a recurrence rule.
    #[derive(Debug, Clone)]
    pub struct CreateRuleCommand {
        pub account_id: String,
        pub kind: RuleKind,
        pub amount: Decimal,
        pub description: String,
        pub frequency: Frequency,
        pub scheduled_date: NaiveDate,
        pub end_date: Option<NaiveDate>,
        /// Ignored for debits
        pub income_type: Option<String>,
        pub created_by: Option<String>,
    }

    /// Partial edit of a rule. `None` leaves a field unchanged.
    #[derive(Debug, Clone, Default)]
    pub struct UpdateRuleCommand {
        pub rule_id: String,
        pub amount: Option<Decimal>,
        pub description: Option<String>,
        pub frequency: Option<Frequency>,
        /// May only move the schedule forward
        pub scheduled_date: Option<NaiveDate>,
        /// `Some(None)` clears the end date
        pub end_date: Option<Option<NaiveDate>>,
        pub income_type: Option<Option<String>>,
        pub active: Option<bool>,
    }
}

pub mod projection {
    use chrono::NaiveDate;

    /// Input for projecting an account forward.
    #[derive(Debug, Clone)]
    pub struct ProjectAccountCommand {
        pub account_id: String,
        pub start_date: NaiveDate,
        pub months: u32,
        pub include_debits: bool,
        pub include_incomes: bool,
    }
}

pub mod audit {
    use chrono::NaiveDate;
    use shared::{TaskKind, TaskStatus};

    /// Input for recording a task run.
    #[derive(Debug, Clone)]
    pub struct RecordTaskRunCommand {
        pub kind: TaskKind,
        pub status: TaskStatus,
        pub applied_count: u32,
        pub duration_ms: u64,
        pub executed_on: NaiveDate,
        pub error_message: Option<String>,
        pub details: Option<serde_json::Value>,
        pub created_by: Option<String>,
    }
}
