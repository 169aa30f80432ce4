//! Balance verification.
//!
//! Balances are maintained incrementally. This service recomputes
//! `opening_balance + Σ entries` from the ledger and compares it with the
//! stored value. It reports, it never repairs.

use anyhow::{anyhow, Result};
use log::{info, warn};
use rust_decimal::Decimal;
use shared::BalanceCheck;
use std::sync::Arc;

use crate::backend::domain::models::Account;
use crate::backend::storage::{AccountRepository, DbConnection, LedgerEntryRepository};

#[derive(Clone)]
pub struct BalanceService {
    account_repository: AccountRepository,
    ledger_entry_repository: LedgerEntryRepository,
}

impl BalanceService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        let account_repository = AccountRepository::new((*db).clone());
        let ledger_entry_repository = LedgerEntryRepository::new((*db).clone());
        Self {
            account_repository,
            ledger_entry_repository,
        }
    }

    pub async fn verify(&self, account_id: &str) -> Result<BalanceCheck> {
        let account = self
            .account_repository
            .get_account(account_id)
            .await?
            .ok_or_else(|| anyhow!("Account {} not found", account_id))?;
        self.check(&account).await
    }

    /// Verify every account of an owner
    pub async fn verify_owner(&self, owner_id: &str) -> Result<Vec<BalanceCheck>> {
        let accounts = self.account_repository.list_accounts_for_owner(owner_id).await?;
        let mut checks = Vec::with_capacity(accounts.len());
        for account in &accounts {
            checks.push(self.check(account).await?);
        }

        let inconsistent = checks.iter().filter(|c| !c.consistent).count();
        info!("Verified {} accounts for {}, {} inconsistent", checks.len(), owner_id, inconsistent);
        Ok(checks)
    }

    async fn check(&self, account: &Account) -> Result<BalanceCheck> {
        let entries = self.ledger_entry_repository.list_entries(&account.id).await?;
        let expected_balance = account.opening_balance + entries.iter().map(|e| e.amount).sum::<Decimal>();
        let consistent = expected_balance == account.balance;

        if !consistent {
            warn!(
                "Balance mismatch on account {}: stored {}, ledger implies {}",
                account.id, account.balance, expected_balance
            );
        }

        Ok(BalanceCheck {
            account_id: account.id.clone(),
            stored_balance: account.balance,
            expected_balance,
            entry_count: u32::try_from(entries.len()).unwrap_or(u32::MAX),
            consistent,
        })
    }
}
