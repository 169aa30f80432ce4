//! Rule management: create, edit, retire and look up recurrence rules.
//!
//! The schedule pointer is only moved forward here on explicit edits. The
//! per-occurrence advance belongs to the transaction processor. Edits are
//! written as a compare-and-set on the pointer they were based on, so an edit
//! racing a batch fails instead of rewinding the schedule.

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{info, warn};
use shared::RuleKind;
use std::sync::Arc;

use crate::backend::domain::commands::rules::{CreateRuleCommand, UpdateRuleCommand};
use crate::backend::domain::models::recurrence::{RecurrenceRule, RuleValidationError};
use crate::backend::storage::{AccountRepository, DbConnection, OccurrenceRepository, RecurrenceRepository};

#[derive(Clone)]
pub struct RecurrenceService {
    recurrence_repository: RecurrenceRepository,
    occurrence_repository: OccurrenceRepository,
    account_repository: AccountRepository,
}

impl RecurrenceService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        let recurrence_repository = RecurrenceRepository::new((*db).clone());
        let occurrence_repository = OccurrenceRepository::new((*db).clone());
        let account_repository = AccountRepository::new((*db).clone());
        Self {
            recurrence_repository,
            occurrence_repository,
            account_repository,
        }
    }

    /// Create a rule on an existing account.
    ///
    /// Does not apply anything; callers follow up with
    /// `TransactionProcessor::record_immediate_if_due` when the first
    /// occurrence is already due.
    pub async fn create_rule(&self, command: CreateRuleCommand) -> Result<RecurrenceRule> {
        if self.account_repository.get_account(&command.account_id).await?.is_none() {
            return Err(anyhow!("Account {} not found", command.account_id));
        }

        let mut rule = RecurrenceRule::new(
            &command.account_id,
            command.kind,
            command.amount,
            command.description.trim(),
            command.frequency,
            command.scheduled_date,
            command.end_date,
        );
        rule.income_type = match command.kind {
            RuleKind::Income => command.income_type.filter(|t| !t.trim().is_empty()),
            RuleKind::Debit => None,
        };
        rule.created_by = command.created_by;
        rule.validate()?;

        self.recurrence_repository.store_rule(&rule).await?;
        info!(
            "Created {} rule {} on account {}: {} {} from {}",
            rule.kind, rule.id, rule.account_id, rule.amount, rule.frequency, rule.scheduled_date
        );
        Ok(rule)
    }

    /// Apply a partial edit. The scheduled date may only move forward.
    ///
    /// An active rule never keeps a pointer on an occurrence that was already
    /// applied: the pointer is stepped past it, and the rule is retired when
    /// no occurrence is left. Fails with `StoreError::Conflict` when a batch
    /// moved the rule after it was read.
    pub async fn update_rule(&self, command: UpdateRuleCommand) -> Result<RecurrenceRule> {
        let mut rule = self
            .recurrence_repository
            .get_rule(&command.rule_id)
            .await?
            .ok_or_else(|| anyhow!("Rule {} not found", command.rule_id))?;
        let read_pointer = rule.scheduled_date;

        if let Some(scheduled_date) = command.scheduled_date {
            if scheduled_date < rule.scheduled_date {
                return Err(RuleValidationError::ScheduleMovedBackwards {
                    current: rule.scheduled_date,
                    requested: scheduled_date,
                }
                .into());
            }
            rule.scheduled_date = scheduled_date;
        }
        if let Some(amount) = command.amount {
            rule.amount = amount;
        }
        if let Some(description) = command.description {
            rule.description = description.trim().to_string();
        }
        if let Some(frequency) = command.frequency {
            rule.frequency = frequency;
        }
        if let Some(end_date) = command.end_date {
            rule.end_date = end_date;
        }
        if let Some(income_type) = command.income_type {
            if rule.kind == RuleKind::Income {
                rule.income_type = income_type.filter(|t| !t.trim().is_empty());
            }
        }
        if let Some(active) = command.active {
            rule.active = active;
        }
        rule.validate()?;
        if rule.active {
            self.skip_applied_occurrences(&mut rule).await?;
        }
        rule.updated_at = Utc::now().to_rfc3339();

        self.recurrence_repository.update_rule(&rule, read_pointer).await?;
        info!("Updated rule {}", rule.id);
        Ok(rule)
    }

    async fn skip_applied_occurrences(&self, rule: &mut RecurrenceRule) -> Result<()> {
        while self.occurrence_repository.exists(&rule.source_id(), rule.kind).await? {
            match rule.next_occurrence(rule.scheduled_date) {
                Some(next) => {
                    warn!(
                        "Rule {} pointed at applied occurrence {}, moving to {}",
                        rule.id, rule.scheduled_date, next
                    );
                    rule.scheduled_date = next;
                }
                None => {
                    info!(
                        "Rule {} has no occurrence left after {}, keeping it retired",
                        rule.id, rule.scheduled_date
                    );
                    rule.active = false;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Retire a rule. Rules are never deleted.
    pub async fn deactivate_rule(&self, rule_id: &str) -> Result<()> {
        self.recurrence_repository.set_active(rule_id, false).await?;
        info!("Deactivated rule {}", rule_id);
        Ok(())
    }

    pub async fn get_rule(&self, rule_id: &str) -> Result<Option<RecurrenceRule>> {
        Ok(self.recurrence_repository.get_rule(rule_id).await?)
    }

    pub async fn list_rules(&self, account_id: &str) -> Result<Vec<RecurrenceRule>> {
        Ok(self.recurrence_repository.list_rules_for_account(account_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::domain::clock::FixedClock;
    use crate::backend::domain::models::Account;
    use crate::backend::domain::transaction_processor::{BatchTrigger, TransactionProcessor};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use shared::Frequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup_test() -> (RecurrenceService, Account) {
        let db = Arc::new(DbConnection::init_test().await.expect("Failed to init test DB"));
        let account = Account::open("user::alice", "Checking", Decimal::from(500));
        AccountRepository::new((*db).clone()).store_account(&account).await.unwrap();
        (RecurrenceService::new(db), account)
    }

    fn create_command(account: &Account, kind: RuleKind) -> CreateRuleCommand {
        CreateRuleCommand {
            account_id: account.id.clone(),
            kind,
            amount: Decimal::new(150000, 2),
            description: "Paycheck".to_string(),
            frequency: Frequency::Monthly,
            scheduled_date: date(2024, 7, 1),
            end_date: None,
            income_type: Some("Salary".to_string()),
            created_by: Some("user::alice".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_rule() {
        let (service, account) = setup_test().await;

        let income = service.create_rule(create_command(&account, RuleKind::Income)).await.unwrap();
        assert!(income.active);
        assert_eq!(income.income_type.as_deref(), Some("Salary"));

        let debit = service.create_rule(create_command(&account, RuleKind::Debit)).await.unwrap();
        assert_eq!(debit.income_type, None);

        assert_eq!(service.get_rule(&income.id).await.unwrap(), Some(income));
        assert_eq!(service.list_rules(&account.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_rule_rejects_invalid_input() {
        let (service, account) = setup_test().await;

        let mut negative = create_command(&account, RuleKind::Debit);
        negative.amount = Decimal::from(-10);
        let err = service.create_rule(negative).await.unwrap_err();
        assert_eq!(err.downcast_ref::<RuleValidationError>(), Some(&RuleValidationError::NegativeAmount));

        let mut backwards_end = create_command(&account, RuleKind::Debit);
        backwards_end.end_date = Some(date(2024, 6, 30));
        let err = service.create_rule(backwards_end).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuleValidationError>(),
            Some(RuleValidationError::EndBeforeScheduled { .. })
        ));

        let mut unknown_account = create_command(&account, RuleKind::Debit);
        unknown_account.account_id = "account::missing".to_string();
        assert!(service.create_rule(unknown_account).await.is_err());

        assert!(service.list_rules(&account.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_rule() {
        let (service, account) = setup_test().await;
        let rule = service.create_rule(create_command(&account, RuleKind::Income)).await.unwrap();

        let updated = service
            .update_rule(UpdateRuleCommand {
                rule_id: rule.id.clone(),
                amount: Some(Decimal::from(1600)),
                scheduled_date: Some(date(2024, 8, 1)),
                end_date: Some(Some(date(2025, 8, 1))),
                income_type: Some(None),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.amount, Decimal::from(1600));
        assert_eq!(updated.scheduled_date, date(2024, 8, 1));
        assert_eq!(updated.end_date, Some(date(2025, 8, 1)));
        assert_eq!(updated.income_type, None);
        assert_eq!(updated.description, "Paycheck");
        assert_eq!(service.get_rule(&rule.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_update_rule_cannot_move_schedule_backwards() {
        let (service, account) = setup_test().await;
        let rule = service.create_rule(create_command(&account, RuleKind::Debit)).await.unwrap();

        let err = service
            .update_rule(UpdateRuleCommand {
                rule_id: rule.id.clone(),
                scheduled_date: Some(date(2024, 6, 1)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuleValidationError>(),
            Some(RuleValidationError::ScheduleMovedBackwards { .. })
        ));

        let stored = service.get_rule(&rule.id).await.unwrap().unwrap();
        assert_eq!(stored.scheduled_date, date(2024, 7, 1));
    }

    #[tokio::test]
    async fn test_deactivate_rule() {
        let (service, account) = setup_test().await;
        let rule = service.create_rule(create_command(&account, RuleKind::Debit)).await.unwrap();

        service.deactivate_rule(&rule.id).await.unwrap();

        let stored = service.get_rule(&rule.id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert!(service.deactivate_rule("rule::missing").await.is_err());
    }

    async fn setup_with_processor(today: NaiveDate) -> (RecurrenceService, TransactionProcessor, Account) {
        let db = Arc::new(DbConnection::init_test().await.expect("Failed to init test DB"));
        let account = Account::open("user::alice", "Checking", Decimal::from(500));
        AccountRepository::new((*db).clone()).store_account(&account).await.unwrap();
        let processor = TransactionProcessor::new(db.clone(), Arc::new(FixedClock::new(today)));
        (RecurrenceService::new(db), processor, account)
    }

    #[tokio::test]
    async fn test_reactivating_retired_rule_moves_past_applied_occurrence() {
        let (service, processor, account) = setup_with_processor(date(2024, 6, 1)).await;
        let mut command = create_command(&account, RuleKind::Debit);
        command.scheduled_date = date(2024, 6, 1);
        command.end_date = Some(date(2024, 6, 1));
        let rule = service.create_rule(command).await.unwrap();

        processor
            .run_daily_batch(date(2024, 6, 1), BatchTrigger::Scheduled, None)
            .await
            .unwrap();
        let retired = service.get_rule(&rule.id).await.unwrap().unwrap();
        assert!(!retired.active);
        assert_eq!(retired.scheduled_date, date(2024, 6, 1));

        let reactivated = service
            .update_rule(UpdateRuleCommand {
                rule_id: rule.id.clone(),
                end_date: Some(Some(date(2024, 12, 31))),
                active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(reactivated.active);
        assert_eq!(reactivated.scheduled_date, date(2024, 7, 1));
        assert_eq!(service.get_rule(&rule.id).await.unwrap(), Some(reactivated));
    }

    #[tokio::test]
    async fn test_reactivation_without_remaining_occurrence_stays_retired() {
        let (service, processor, account) = setup_with_processor(date(2024, 6, 1)).await;
        let mut command = create_command(&account, RuleKind::Debit);
        command.scheduled_date = date(2024, 6, 1);
        command.end_date = Some(date(2024, 6, 1));
        let rule = service.create_rule(command).await.unwrap();

        processor
            .run_daily_batch(date(2024, 6, 1), BatchTrigger::Scheduled, None)
            .await
            .unwrap();

        let updated = service
            .update_rule(UpdateRuleCommand {
                rule_id: rule.id.clone(),
                end_date: Some(Some(date(2024, 6, 20))),
                active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!updated.active);
        assert_eq!(updated.scheduled_date, date(2024, 6, 1));
        assert_eq!(updated.end_date, Some(date(2024, 6, 20)));
    }
}
