use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An account whose balance is maintained incrementally by ledger entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    /// Seed balance the account was opened with
    pub opening_balance: Decimal,
    /// opening_balance plus every booked ledger entry
    pub balance: Decimal,
    pub created_at: String,
    pub updated_at: String,
}

impl Account {
    /// Generate an account ID
    pub fn generate_id() -> String {
        format!("account::{}", uuid::Uuid::new_v4())
    }

    /// Open a new account seeded with `opening_balance`
    pub fn open(owner_id: &str, name: &str, opening_balance: Decimal) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Self::generate_id(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            opening_balance,
            balance: opening_balance,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
