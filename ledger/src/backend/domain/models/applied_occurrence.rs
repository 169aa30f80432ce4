use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::RuleKind;

use super::{ledger_entry::LedgerEntry, recurrence::RecurrenceRule};

/// Durable proof that one occurrence of a rule has been applied.
///
/// `(source_id, rule_kind)` is unique in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOccurrence {
    pub id: String,
    pub source_id: String,
    pub rule_kind: RuleKind,
    pub rule_id: String,
    pub account_id: String,
    /// Signed amount that was added to the balance
    pub amount: Decimal,
    pub booked_on: NaiveDate,
    pub ledger_entry_id: String,
    pub created_at: String,
}

impl AppliedOccurrence {
    /// Record for the occurrence `rule` points at, booked as `entry`
    pub fn record(rule: &RecurrenceRule, entry: &LedgerEntry) -> Self {
        Self {
            id: format!("occurrence::{}", uuid::Uuid::new_v4()),
            source_id: rule.source_id(),
            rule_kind: rule.kind,
            rule_id: rule.id.clone(),
            account_id: rule.account_id.clone(),
            amount: entry.amount,
            booked_on: entry.booked_on,
            ledger_entry_id: entry.id.clone(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
