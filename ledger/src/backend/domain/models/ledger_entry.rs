use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::Provenance;

use super::recurrence::RecurrenceRule;

/// A booked, balance-affecting record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub account_id: String,
    /// Signed amount added to the account balance
    pub amount: Decimal,
    pub description: String,
    pub booked_on: NaiveDate,
    pub provenance: Provenance,
    /// Rule that produced the entry, for automatic entries
    pub rule_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

impl LedgerEntry {
    /// Generate an entry ID in format "entry::<provenance>::<uuid>"
    pub fn generate_id(provenance: Provenance) -> String {
        format!("entry::{}::{}", provenance, uuid::Uuid::new_v4())
    }

    /// Entry typed in by a user
    pub fn manual(
        account_id: &str,
        amount: Decimal,
        description: &str,
        booked_on: NaiveDate,
        created_by: Option<String>,
    ) -> Self {
        Self {
            id: Self::generate_id(Provenance::Manual),
            account_id: account_id.to_string(),
            amount,
            description: description.to_string(),
            booked_on,
            provenance: Provenance::Manual,
            rule_id: None,
            created_by,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Entry booked for the occurrence a rule currently points at
    pub fn for_occurrence(rule: &RecurrenceRule, booked_on: NaiveDate) -> Self {
        let provenance = rule.kind.provenance();
        Self {
            id: Self::generate_id(provenance),
            account_id: rule.account_id.clone(),
            amount: rule.signed_amount(),
            description: rule.entry_description(),
            booked_on,
            provenance,
            rule_id: Some(rule.id.clone()),
            created_by: rule.created_by.clone(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
