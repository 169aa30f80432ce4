//! Accounts and manual ledger entries.
//!
//! Every balance change is written in the same transaction as the entry that
//! explains it, so `balance == opening_balance + Σ entries` always holds.

use anyhow::{anyhow, bail, Result};
use log::info;
use shared::Provenance;
use std::sync::Arc;

use crate::backend::domain::commands::accounts::{ManualEntryCommand, OpenAccountCommand};
use crate::backend::domain::models::{Account, LedgerEntry};
use crate::backend::storage::{AccountRepository, DbConnection, LedgerEntryRepository};

#[derive(Clone)]
pub struct AccountService {
    db: Arc<DbConnection>,
    account_repository: AccountRepository,
    ledger_entry_repository: LedgerEntryRepository,
}

impl AccountService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        let account_repository = AccountRepository::new((*db).clone());
        let ledger_entry_repository = LedgerEntryRepository::new((*db).clone());
        Self {
            db,
            account_repository,
            ledger_entry_repository,
        }
    }

    /// Open an account seeded with its opening balance
    pub async fn open_account(&self, command: OpenAccountCommand) -> Result<Account> {
        if command.name.trim().is_empty() {
            bail!("Account name cannot be empty");
        }

        let account = Account::open(&command.owner_id, command.name.trim(), command.opening_balance);
        self.account_repository.store_account(&account).await?;
        info!("Opened account {} for {} with balance {}", account.id, account.owner_id, account.balance);
        Ok(account)
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.account_repository.get_account(account_id).await?)
    }

    pub async fn list_accounts(&self, owner_id: &str) -> Result<Vec<Account>> {
        Ok(self.account_repository.list_accounts_for_owner(owner_id).await?)
    }

    /// Book a manual entry and move the balance by its amount
    pub async fn record_manual_entry(&self, command: ManualEntryCommand) -> Result<LedgerEntry> {
        if command.description.trim().is_empty() {
            bail!("Entry description cannot be empty");
        }

        let entry = LedgerEntry::manual(
            &command.account_id,
            command.amount,
            command.description.trim(),
            command.booked_on,
            command.created_by,
        );

        let mut tx = self.db.pool().begin().await?;
        let account = self
            .account_repository
            .get_account_with(&mut *tx, &command.account_id)
            .await?
            .ok_or_else(|| anyhow!("Account {} not found", command.account_id))?;

        self.ledger_entry_repository.store_entry_with(&mut *tx, &entry).await?;
        self.account_repository
            .update_balance_with(&mut *tx, &account.id, account.balance + entry.amount)
            .await?;
        tx.commit().await?;

        info!("Booked manual entry {} of {} on account {}", entry.id, entry.amount, account.id);
        Ok(entry)
    }

    /// Delete a manual entry and reverse its effect on the balance.
    ///
    /// Automatic entries are backed by an applied occurrence and cannot be deleted.
    pub async fn delete_manual_entry(&self, entry_id: &str) -> Result<LedgerEntry> {
        let mut tx = self.db.pool().begin().await?;

        let entry = self
            .ledger_entry_repository
            .get_entry_with(&mut *tx, entry_id)
            .await?
            .ok_or_else(|| anyhow!("Ledger entry {} not found", entry_id))?;
        if entry.provenance != Provenance::Manual {
            bail!("Ledger entry {} was booked automatically ({}) and cannot be deleted", entry.id, entry.provenance);
        }

        let account = self
            .account_repository
            .get_account_with(&mut *tx, &entry.account_id)
            .await?
            .ok_or_else(|| anyhow!("Account {} not found", entry.account_id))?;

        self.ledger_entry_repository.delete_entry_with(&mut *tx, &entry.id).await?;
        self.account_repository
            .update_balance_with(&mut *tx, &account.id, account.balance - entry.amount)
            .await?;
        tx.commit().await?;

        info!("Deleted manual entry {} and reversed {} on account {}", entry.id, entry.amount, account.id);
        Ok(entry)
    }

    pub async fn list_entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self.ledger_entry_repository.list_entries(account_id).await?)
    }
}
