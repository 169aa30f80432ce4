use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored or user-supplied label does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Whether a recurrence takes money out of an account or puts money in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Automatic debit (subtracts from the balance)
    Debit,
    /// Recurring income (adds to the balance)
    Income,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Debit => "debit",
            RuleKind::Income => "income",
        }
    }

    /// Apply the kind's sign to a non-negative magnitude
    pub fn signed(&self, magnitude: Decimal) -> Decimal {
        match self {
            RuleKind::Debit => -magnitude.abs(),
            RuleKind::Income => magnitude.abs(),
        }
    }

    /// Ledger provenance of entries booked for this kind of rule
    pub fn provenance(&self) -> Provenance {
        match self {
            RuleKind::Debit => Provenance::DebitOccurrence,
            RuleKind::Income => Provenance::IncomeOccurrence,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(RuleKind::Debit),
            "income" => Ok(RuleKind::Income),
            other => Err(UnknownVariant {
                kind: "rule kind",
                value: other.to_string(),
            }),
        }
    }
}

/// How often a recurrence rule produces an occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Date of the occurrence following `date`.
    ///
    /// Calendar-month steps keep the day of month and clamp to the last day of
    /// shorter months, so 2024-01-31 is followed by 2024-02-29.
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Weekly => date.checked_add_days(Days::new(7)),
            Frequency::Monthly => date.checked_add_months(Months::new(1)),
            Frequency::Quarterly => date.checked_add_months(Months::new(3)),
            Frequency::Yearly => date.checked_add_months(Months::new(12)),
        }
    }

    /// Approximate amount per month of something paid at this frequency
    pub fn monthly_equivalent(&self, amount: Decimal) -> Decimal {
        match self {
            Frequency::Weekly => amount * Decimal::new(433, 2),
            Frequency::Monthly => amount,
            Frequency::Quarterly => amount / Decimal::from(3),
            Frequency::Yearly => amount / Decimal::from(12),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(UnknownVariant {
                kind: "frequency",
                value: other.to_string(),
            }),
        }
    }
}

/// Where a ledger entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Entered directly by a user
    Manual,
    /// Booked by the processor for a debit rule occurrence
    DebitOccurrence,
    /// Booked by the processor for an income rule occurrence
    IncomeOccurrence,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Manual => "manual",
            Provenance::DebitOccurrence => "debit-occurrence",
            Provenance::IncomeOccurrence => "income-occurrence",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Provenance::Manual),
            "debit-occurrence" => Ok(Provenance::DebitOccurrence),
            "income-occurrence" => Ok(Provenance::IncomeOccurrence),
            other => Err(UnknownVariant {
                kind: "provenance",
                value: other.to_string(),
            }),
        }
    }
}

/// What kind of run produced a task audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Immediate application of a single debit rule
    DebitBatch,
    /// Immediate application of a single income rule
    IncomeBatch,
    /// Scheduled sweep over every due rule
    CombinedBatch,
    /// Sweep triggered explicitly by an administrator
    ManualTrigger,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::DebitBatch => "debit-batch",
            TaskKind::IncomeBatch => "income-batch",
            TaskKind::CombinedBatch => "combined-batch",
            TaskKind::ManualTrigger => "manual-trigger",
        }
    }

    /// Task kind recorded when a single rule is applied right after creation
    pub fn for_rule_kind(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Debit => TaskKind::DebitBatch,
            RuleKind::Income => TaskKind::IncomeBatch,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit-batch" => Ok(TaskKind::DebitBatch),
            "income-batch" => Ok(TaskKind::IncomeBatch),
            "combined-batch" => Ok(TaskKind::CombinedBatch),
            "manual-trigger" => Ok(TaskKind::ManualTrigger),
            other => Err(UnknownVariant {
                kind: "task kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Error,
    Partial,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
            TaskStatus::Partial => "partial",
        }
    }

    /// Status of a run given how many rules were applied and how many failed
    pub fn from_counts(applied: u32, failed: u32) -> Self {
        match (applied, failed) {
            (_, 0) => TaskStatus::Success,
            (0, _) => TaskStatus::Error,
            _ => TaskStatus::Partial,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TaskStatus::Success),
            "error" => Ok(TaskStatus::Error),
            "partial" => Ok(TaskStatus::Partial),
            other => Err(UnknownVariant {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

/// Result of one processing sweep over the due rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Date the sweep was run for
    pub as_of: NaiveDate,
    pub applied_debits: u32,
    pub applied_incomes: u32,
    /// applied_debits + applied_incomes
    pub total: u32,
    /// Rules whose occurrence had already been applied
    pub skipped_duplicates: u32,
    /// Rules that failed and stay due for the next run
    pub failed: u32,
    pub duration_ms: u64,
    pub status: TaskStatus,
    /// Audit record written for this sweep, if the write succeeded
    pub task_run_id: Option<String>,
}

/// A single simulated occurrence inside a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedOccurrence {
    pub date: NaiveDate,
    /// Negative for debits, positive for incomes
    pub amount: Decimal,
    pub description: String,
    pub kind: RuleKind,
    pub rule_id: String,
}

/// One calendar month of a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthProjection {
    /// 1-based month index within the projection
    pub month: u32,
    pub start_date: NaiveDate,
    /// Inclusive last day of the month bucket
    pub end_date: NaiveDate,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub total_income: Decimal,
    /// Sum of debit magnitudes (positive)
    pub total_debit: Decimal,
    /// total_income - total_debit
    pub variation: Decimal,
    pub occurrences: Vec<ProjectedOccurrence>,
}

/// Aggregates across the whole projection horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionTotals {
    pub total_income: Decimal,
    pub total_debit: Decimal,
    /// Lowest monthly closing balance
    pub minimum_balance: Decimal,
    /// Highest monthly closing balance
    pub maximum_balance: Decimal,
    /// Number of months that close below zero
    pub negative_months: u32,
}

/// Full projection of an account over a horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProjection {
    pub account_id: String,
    pub account_name: String,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub total_variation: Decimal,
    pub start_date: NaiveDate,
    /// start_date + months
    pub end_date: NaiveDate,
    pub months: u32,
    pub monthly: Vec<MonthProjection>,
    pub totals: ProjectionTotals,
}

/// Applied automatic occurrences of an account over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomaticTransactionSummary {
    pub account_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_transactions: u32,
    pub debits_count: u32,
    pub incomes_count: u32,
    /// Signed (non-positive) total of debit occurrences
    pub debits_total: Decimal,
    pub incomes_total: Decimal,
    pub net_impact: Decimal,
}

/// A rule occurrence coming up soon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingOccurrence {
    pub rule_id: String,
    pub kind: RuleKind,
    pub description: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub days_remaining: i64,
}

/// Monthly view of the active rules of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub account_id: String,
    pub current_balance: Decimal,
    pub active_debits: u32,
    pub active_incomes: u32,
    pub monthly_debits: Decimal,
    pub monthly_incomes: Decimal,
    /// monthly_incomes - monthly_debits
    pub estimated_monthly_net: Decimal,
    pub positive: bool,
    pub upcoming: Vec<UpcomingOccurrence>,
}

/// Comparison between the stored balance and the balance implied by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub account_id: String,
    pub stored_balance: Decimal,
    pub expected_balance: Decimal,
    pub entry_count: u32,
    pub consistent: bool,
}
