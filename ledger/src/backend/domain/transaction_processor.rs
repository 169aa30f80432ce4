//! Applies due recurrence rules to the ledger, exactly once per occurrence.
//!
//! Each rule is processed in its own transaction:
//! 1. re-check the idempotency store
//! 2. insert the applied occurrence (the unique key is the final arbiter)
//! 3. append the ledger entry
//! 4. move the account balance
//! 5. advance the schedule pointer, or retire the rule when nothing follows
//!
//! A batch is not atomic. A failing rule is rolled back on its own, logged,
//! and stays due for the next run.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use serde_json::json;
use shared::{BatchSummary, RuleKind, TaskKind, TaskStatus};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::domain::clock::Clock;
use crate::backend::domain::commands::audit::RecordTaskRunCommand;
use crate::backend::domain::errors::ProcessingError;
use crate::backend::domain::models::{AppliedOccurrence, LedgerEntry, RecurrenceRule};
use crate::backend::domain::task_audit_service::TaskAuditService;
use crate::backend::storage::{
    AccountRepository, DbConnection, LedgerEntryRepository, OccurrenceRepository, RecurrenceRepository, StoreError,
    UnreadableRule,
};

/// Who asked for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTrigger {
    /// Daily scheduler
    Scheduled,
    /// An administrator
    Manual,
}

impl BatchTrigger {
    pub fn task_kind(&self) -> TaskKind {
        match self {
            BatchTrigger::Scheduled => TaskKind::CombinedBatch,
            BatchTrigger::Manual => TaskKind::ManualTrigger,
        }
    }
}

/// Per-rule outcomes of one run
#[derive(Debug, Default)]
struct BatchTally {
    applied_debits: u32,
    applied_incomes: u32,
    skipped_duplicates: u32,
    failures: Vec<serde_json::Value>,
}

impl BatchTally {
    fn record(&mut self, rule: &RecurrenceRule, outcome: Result<AppliedOccurrence, ProcessingError>) {
        match outcome {
            Ok(occurrence) => {
                match rule.kind {
                    RuleKind::Debit => self.applied_debits += 1,
                    RuleKind::Income => self.applied_incomes += 1,
                }
                debug!(
                    "Applied {} ({}) to account {}",
                    occurrence.source_id, occurrence.amount, occurrence.account_id
                );
            }
            Err(ProcessingError::Duplicate { source_id }) => {
                self.skipped_duplicates += 1;
                info!("Occurrence {} already applied, skipping", source_id);
            }
            Err(e) => {
                error!("Failed to apply rule {}: {}", rule.id, e);
                self.failures.push(json!({
                    "rule_id": rule.id,
                    "scheduled_date": rule.scheduled_date,
                    "error": e.to_string(),
                }));
            }
        }
    }

    fn record_unreadable(&mut self, unreadable: UnreadableRule) {
        error!("Skipping rule {}: {}", unreadable.rule_id, unreadable.error);
        self.failures.push(json!({
            "rule_id": unreadable.rule_id,
            "error": unreadable.error.to_string(),
        }));
    }

    fn applied(&self) -> u32 {
        self.applied_debits + self.applied_incomes
    }

    fn failed(&self) -> u32 {
        u32::try_from(self.failures.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Clone)]
pub struct TransactionProcessor {
    db: Arc<DbConnection>,
    recurrence_repository: RecurrenceRepository,
    occurrence_repository: OccurrenceRepository,
    ledger_entry_repository: LedgerEntryRepository,
    account_repository: AccountRepository,
    task_audit_service: TaskAuditService,
    clock: Arc<dyn Clock>,
}

impl TransactionProcessor {
    pub fn new(db: Arc<DbConnection>, clock: Arc<dyn Clock>) -> Self {
        Self {
            recurrence_repository: RecurrenceRepository::new((*db).clone()),
            occurrence_repository: OccurrenceRepository::new((*db).clone()),
            ledger_entry_repository: LedgerEntryRepository::new((*db).clone()),
            account_repository: AccountRepository::new((*db).clone()),
            task_audit_service: TaskAuditService::new(db.clone()),
            db,
            clock,
        }
    }

    /// Run the batch for the clock's current date
    pub async fn run_today(&self, trigger: BatchTrigger, created_by: Option<String>) -> Result<BatchSummary> {
        self.run_daily_batch(self.clock.today(), trigger, created_by).await
    }

    /// Apply every rule due on `as_of` and record one task run for the sweep.
    ///
    /// Per-rule failures, rules that cannot be read back included, are
    /// counted in the summary. Only failing to query the due rules is returned
    /// as an error.
    pub async fn run_daily_batch(
        &self,
        as_of: NaiveDate,
        trigger: BatchTrigger,
        created_by: Option<String>,
    ) -> Result<BatchSummary> {
        let started = Instant::now();
        let kind = trigger.task_kind();
        info!("Starting {} for {}", kind, as_of);

        let due_rules = self.recurrence_repository.list_due_rules(as_of).await?;
        info!("Found {} due rules for {}", due_rules.len(), as_of);

        let mut tally = BatchTally::default();
        for due in due_rules {
            match due {
                Ok(rule) => {
                    let outcome = self.process_rule(&rule, as_of).await;
                    tally.record(&rule, outcome);
                }
                Err(unreadable) => tally.record_unreadable(unreadable),
            }
        }

        Ok(self.finish(kind, as_of, tally, started, created_by).await)
    }

    /// Apply a freshly created or edited rule right away when its scheduled
    /// date has already arrived.
    ///
    /// Returns `None` without writing anything when the rule is not due or its
    /// occurrence was already applied.
    pub async fn record_immediate_if_due(&self, rule: &RecurrenceRule) -> Result<Option<BatchSummary>> {
        let as_of = self.clock.today();
        let current = self
            .recurrence_repository
            .get_rule(&rule.id)
            .await?
            .ok_or_else(|| anyhow!("Rule {} not found", rule.id))?;

        if !current.is_due(as_of) {
            debug!("Rule {} is not due on {}", current.id, as_of);
            return Ok(None);
        }

        let started = Instant::now();
        let outcome = self.process_rule(&current, as_of).await;
        if let Err(ProcessingError::Duplicate { source_id }) = &outcome {
            info!("Occurrence {} already applied, nothing to record", source_id);
            return Ok(None);
        }

        let mut tally = BatchTally::default();
        tally.record(&current, outcome);
        let kind = TaskKind::for_rule_kind(current.kind);
        Ok(Some(self.finish(kind, as_of, tally, started, current.created_by.clone()).await))
    }

    /// Apply the occurrence `rule` currently points at, as one atomic unit.
    pub async fn process_rule(
        &self,
        rule: &RecurrenceRule,
        as_of: NaiveDate,
    ) -> Result<AppliedOccurrence, ProcessingError> {
        if let Err(e) = rule.validate() {
            return Err(ProcessingError::InvalidRuleState {
                rule_id: rule.id.clone(),
                reason: e.to_string(),
            });
        }
        if !rule.is_due(as_of) {
            return Err(ProcessingError::InvalidRuleState {
                rule_id: rule.id.clone(),
                reason: format!("not due on {}", as_of),
            });
        }

        let source_id = rule.source_id();
        if self.occurrence_repository.exists(&source_id, rule.kind).await? {
            return Err(ProcessingError::Duplicate { source_id });
        }

        let mut tx = self.db.pool().begin().await?;

        // Another run may have committed since the pre-check
        if self.occurrence_repository.exists_with(&mut *tx, &source_id, rule.kind).await? {
            return Err(ProcessingError::Duplicate { source_id });
        }

        let entry = LedgerEntry::for_occurrence(rule, as_of);
        let occurrence = AppliedOccurrence::record(rule, &entry);
        match self.occurrence_repository.create_with(&mut *tx, &occurrence).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => return Err(ProcessingError::Duplicate { source_id }),
            Err(e) => return Err(e.into()),
        }

        self.ledger_entry_repository.store_entry_with(&mut *tx, &entry).await?;

        let account = self
            .account_repository
            .get_account_with(&mut *tx, &rule.account_id)
            .await?
            .ok_or_else(|| ProcessingError::InvalidRuleState {
                rule_id: rule.id.clone(),
                reason: format!("account {} does not exist", rule.account_id),
            })?;
        self.account_repository
            .update_balance_with(&mut *tx, &account.id, account.balance + entry.amount)
            .await?;

        let next = rule.next_occurrence(as_of);
        let advanced = self
            .recurrence_repository
            .advance_schedule_with(&mut *tx, &rule.id, rule.scheduled_date, next)
            .await?;
        if !advanced {
            return Err(ProcessingError::InvalidRuleState {
                rule_id: rule.id.clone(),
                reason: "schedule changed while the occurrence was being applied".to_string(),
            });
        }

        tx.commit().await?;

        match next {
            Some(next) => debug!("Rule {} advanced to {}", rule.id, next),
            None => info!("Rule {} has no occurrence after {}, retired", rule.id, as_of),
        }
        Ok(occurrence)
    }

    async fn finish(
        &self,
        kind: TaskKind,
        as_of: NaiveDate,
        tally: BatchTally,
        started: Instant,
        created_by: Option<String>,
    ) -> BatchSummary {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let applied = tally.applied();
        let failed = tally.failed();
        let status = TaskStatus::from_counts(applied, failed);

        let error_message = tally
            .failures
            .first()
            .map(|first| format!("{} rule(s) failed, first: {}", failed, first["error"]));
        let details = json!({
            "as_of": as_of,
            "applied_debits": tally.applied_debits,
            "applied_incomes": tally.applied_incomes,
            "skipped_duplicates": tally.skipped_duplicates,
            "failed": failed,
            "failures": tally.failures,
        });

        let command = RecordTaskRunCommand {
            kind,
            status,
            applied_count: applied,
            duration_ms,
            executed_on: as_of,
            error_message,
            details: Some(details),
            created_by,
        };
        let task_run_id = match self.task_audit_service.record(command).await {
            Ok(run) => Some(run.id),
            Err(e) => {
                warn!("Could not record {} task run for {}: {}", kind, as_of, e);
                None
            }
        };

        info!(
            "Finished {} for {}: {} applied ({} debits, {} incomes), {} duplicates, {} failed in {}ms",
            kind, as_of, applied, tally.applied_debits, tally.applied_incomes, tally.skipped_duplicates, failed, duration_ms
        );

        BatchSummary {
            as_of,
            applied_debits: tally.applied_debits,
            applied_incomes: tally.applied_incomes,
            total: applied,
            skipped_duplicates: tally.skipped_duplicates,
            failed,
            duration_ms,
            status,
            task_run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::domain::clock::FixedClock;
    use crate::backend::domain::commands::rules::UpdateRuleCommand;
    use crate::backend::domain::models::Account;
    use crate::backend::domain::recurrence_service::RecurrenceService;
    use rust_decimal::Decimal;
    use shared::Frequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        db: Arc<DbConnection>,
        processor: TransactionProcessor,
        rules: RecurrenceRepository,
        occurrences: OccurrenceRepository,
        accounts: AccountRepository,
        entries: LedgerEntryRepository,
        audit: TaskAuditService,
        account: Account,
    }

    impl Fixture {
        async fn add_rule(
            &self,
            kind: RuleKind,
            amount: Decimal,
            frequency: Frequency,
            scheduled: NaiveDate,
            end: Option<NaiveDate>,
        ) -> RecurrenceRule {
            let rule = RecurrenceRule::new(&self.account.id, kind, amount, "Test rule", frequency, scheduled, end);
            self.rules.store_rule(&rule).await.expect("Failed to store rule");
            rule
        }

        async fn balance(&self) -> Decimal {
            self.accounts.get_account(&self.account.id).await.unwrap().unwrap().balance
        }

        async fn reload(&self, rule: &RecurrenceRule) -> RecurrenceRule {
            self.rules.get_rule(&rule.id).await.unwrap().unwrap()
        }

        async fn batch(&self, as_of: NaiveDate) -> BatchSummary {
            self.processor
                .run_daily_batch(as_of, BatchTrigger::Scheduled, None)
                .await
                .expect("Batch failed")
        }
    }

    async fn setup_test(today: NaiveDate) -> Fixture {
        let db = Arc::new(DbConnection::init_test().await.expect("Failed to init test DB"));
        let account = Account::open("user::alice", "Checking", Decimal::from(1000));
        let accounts = AccountRepository::new((*db).clone());
        accounts.store_account(&account).await.unwrap();

        Fixture {
            processor: TransactionProcessor::new(db.clone(), Arc::new(FixedClock::new(today))),
            rules: RecurrenceRepository::new((*db).clone()),
            occurrences: OccurrenceRepository::new((*db).clone()),
            entries: LedgerEntryRepository::new((*db).clone()),
            audit: TaskAuditService::new(db.clone()),
            accounts,
            account,
            db,
        }
    }

    #[tokio::test]
    async fn test_batch_applies_due_rules() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let debit = fx
            .add_rule(RuleKind::Debit, Decimal::new(5000, 2), Frequency::Monthly, date(2024, 6, 1), None)
            .await;
        let income = fx
            .add_rule(RuleKind::Income, Decimal::from(2000), Frequency::Monthly, date(2024, 5, 28), None)
            .await;
        fx.add_rule(RuleKind::Income, Decimal::from(99), Frequency::Monthly, date(2024, 6, 2), None)
            .await;

        let summary = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(summary.applied_debits, 1);
        assert_eq!(summary.applied_incomes, 1);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.status, TaskStatus::Success);
        assert_eq!(fx.balance().await, Decimal::new(295000, 2));

        assert_eq!(fx.reload(&debit).await.scheduled_date, date(2024, 7, 1));
        assert_eq!(fx.reload(&income).await.scheduled_date, date(2024, 6, 28));

        let entries = fx.entries.list_entries(&fx.account.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        let debit_entry = entries.iter().find(|e| e.rule_id.as_deref() == Some(debit.id.as_str())).unwrap();
        assert_eq!(debit_entry.amount, Decimal::new(-5000, 2));
        assert_eq!(debit_entry.description, "Automatic debit - Test rule");
        assert_eq!(debit_entry.booked_on, date(2024, 6, 1));
    }

    #[tokio::test]
    async fn test_rerunning_batch_is_idempotent() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let rule = fx
            .add_rule(RuleKind::Debit, Decimal::from(75), Frequency::Monthly, date(2024, 6, 1), None)
            .await;

        let first = fx.batch(date(2024, 6, 1)).await;
        let second = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(first.total, 1);
        assert_eq!(second.total, 0);
        assert_eq!(second.status, TaskStatus::Success);
        assert_eq!(fx.balance().await, Decimal::from(925));
        assert_eq!(fx.occurrences.count_for_rule(&rule.id).await.unwrap(), 1);
        assert_eq!(fx.reload(&rule).await.scheduled_date, date(2024, 7, 1));
    }

    #[tokio::test]
    async fn test_already_applied_occurrence_is_skipped() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let rule = fx
            .add_rule(RuleKind::Income, Decimal::from(40), Frequency::Weekly, date(2024, 6, 1), None)
            .await;

        // Applied by someone else without the pointer having moved yet
        let entry = LedgerEntry::for_occurrence(&rule, date(2024, 6, 1));
        fx.occurrences
            .create_with(fx.db.pool(), &AppliedOccurrence::record(&rule, &entry))
            .await
            .unwrap();

        let summary = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(summary.total, 0);
        assert_eq!(summary.skipped_duplicates, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.status, TaskStatus::Success);
        assert_eq!(fx.balance().await, Decimal::from(1000));
        assert_eq!(fx.reload(&rule).await.scheduled_date, date(2024, 6, 1));
    }

    #[tokio::test]
    async fn test_month_end_clamp_across_batches() {
        let fx = setup_test(date(2024, 1, 31)).await;
        let rule = fx
            .add_rule(RuleKind::Debit, Decimal::from(10), Frequency::Monthly, date(2024, 1, 31), None)
            .await;

        fx.batch(date(2024, 1, 31)).await;
        assert_eq!(fx.reload(&rule).await.scheduled_date, date(2024, 2, 29));

        fx.batch(date(2024, 2, 29)).await;
        assert_eq!(fx.reload(&rule).await.scheduled_date, date(2024, 3, 29));

        assert_eq!(fx.balance().await, Decimal::from(980));
    }

    #[tokio::test]
    async fn test_expiring_rule_is_applied_once_and_retired() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let rule = fx
            .add_rule(
                RuleKind::Debit,
                Decimal::from(300),
                Frequency::Monthly,
                date(2024, 6, 1),
                Some(date(2024, 6, 1)),
            )
            .await;

        let summary = fx.batch(date(2024, 6, 1)).await;
        assert_eq!(summary.total, 1);

        let stored = fx.reload(&rule).await;
        assert!(!stored.active);
        assert_eq!(stored.scheduled_date, date(2024, 6, 1));

        for day in [date(2024, 6, 1), date(2024, 7, 1), date(2024, 12, 31)] {
            assert_eq!(fx.batch(day).await.total, 0);
        }
        assert_eq!(fx.occurrences.count_for_rule(&rule.id).await.unwrap(), 1);
        assert_eq!(fx.balance().await, Decimal::from(700));
    }

    #[tokio::test]
    async fn test_overdue_rule_jumps_past_as_of() {
        let fx = setup_test(date(2024, 1, 20)).await;
        let rule = fx
            .add_rule(RuleKind::Debit, Decimal::from(5), Frequency::Weekly, date(2024, 1, 1), None)
            .await;

        let summary = fx.batch(date(2024, 1, 20)).await;

        assert_eq!(summary.total, 1);
        assert_eq!(fx.reload(&rule).await.scheduled_date, date(2024, 1, 22));
        assert_eq!(fx.balance().await, Decimal::from(995));
    }

    #[tokio::test]
    async fn test_inactive_and_expired_rules_are_excluded() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let inactive = fx
            .add_rule(RuleKind::Income, Decimal::from(500), Frequency::Monthly, date(2024, 6, 1), None)
            .await;
        fx.rules.set_active(&inactive.id, false).await.unwrap();
        fx.add_rule(
            RuleKind::Debit,
            Decimal::from(20),
            Frequency::Monthly,
            date(2024, 5, 1),
            Some(date(2024, 5, 31)),
        )
        .await;

        let summary = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(summary.total, 0);
        assert_eq!(summary.skipped_duplicates, 0);
        assert_eq!(fx.balance().await, Decimal::from(1000));
    }

    #[tokio::test]
    async fn test_invalid_rule_fails_without_blocking_others() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let broken = fx
            .add_rule(RuleKind::Debit, Decimal::from(10), Frequency::Monthly, date(2024, 6, 1), None)
            .await;
        let healthy = fx
            .add_rule(RuleKind::Income, Decimal::from(250), Frequency::Monthly, date(2024, 6, 1), None)
            .await;

        sqlx::query("UPDATE recurrence_rules SET amount = '-10' WHERE id = ?")
            .bind(&broken.id)
            .execute(fx.db.pool())
            .await
            .unwrap();

        let summary = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(summary.applied_incomes, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.status, TaskStatus::Partial);
        assert_eq!(fx.balance().await, Decimal::from(1250));

        // The broken rule is left untouched and stays due
        let stored = fx.reload(&broken).await;
        assert_eq!(stored.scheduled_date, date(2024, 6, 1));
        assert!(stored.active);
        assert_eq!(fx.reload(&healthy).await.scheduled_date, date(2024, 7, 1));

        let run = fx.audit.get(summary.task_run_id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(run.status, TaskStatus::Partial);
        assert!(run.error_message.unwrap().starts_with("1 rule(s) failed"));
        assert_eq!(run.details["failures"][0]["rule_id"], broken.id.as_str());
    }

    #[tokio::test]
    async fn test_all_rules_failing_is_an_error_run() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let broken = fx
            .add_rule(RuleKind::Debit, Decimal::from(10), Frequency::Monthly, date(2024, 6, 1), None)
            .await;
        sqlx::query("UPDATE recurrence_rules SET description = '' WHERE id = ?")
            .bind(&broken.id)
            .execute(fx.db.pool())
            .await
            .unwrap();

        let summary = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(summary.total, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.status, TaskStatus::Error);
        assert_eq!(fx.balance().await, Decimal::from(1000));
    }

    #[tokio::test]
    async fn test_unreadable_rule_does_not_abort_batch() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let unreadable = fx
            .add_rule(RuleKind::Debit, Decimal::from(10), Frequency::Monthly, date(2024, 6, 1), None)
            .await;
        let healthy = fx
            .add_rule(RuleKind::Income, Decimal::from(250), Frequency::Monthly, date(2024, 6, 1), None)
            .await;

        sqlx::query("UPDATE recurrence_rules SET frequency = 'daily' WHERE id = ?")
            .bind(&unreadable.id)
            .execute(fx.db.pool())
            .await
            .unwrap();

        let summary = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(summary.applied_incomes, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.status, TaskStatus::Partial);
        assert_eq!(fx.balance().await, Decimal::from(1250));
        assert_eq!(fx.reload(&healthy).await.scheduled_date, date(2024, 7, 1));
        assert_eq!(fx.occurrences.count_for_rule(&unreadable.id).await.unwrap(), 0);

        let run = fx.audit.get(summary.task_run_id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(run.status, TaskStatus::Partial);
        assert_eq!(run.details["failures"][0]["rule_id"], unreadable.id.as_str());
        assert!(run.error_message.unwrap().contains("frequency"));
    }

    #[tokio::test]
    async fn test_reactivated_rule_resumes_after_applied_occurrence() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let rule = fx
            .add_rule(
                RuleKind::Debit,
                Decimal::from(300),
                Frequency::Monthly,
                date(2024, 6, 1),
                Some(date(2024, 6, 1)),
            )
            .await;
        fx.batch(date(2024, 6, 1)).await;
        assert!(!fx.reload(&rule).await.active);

        RecurrenceService::new(fx.db.clone())
            .update_rule(UpdateRuleCommand {
                rule_id: rule.id.clone(),
                end_date: Some(Some(date(2024, 12, 31))),
                active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        for day in [date(2024, 7, 1), date(2024, 8, 1), date(2024, 9, 1)] {
            let summary = fx.batch(day).await;
            assert_eq!(summary.total, 1);
            assert_eq!(summary.skipped_duplicates, 0);
        }
        assert_eq!(fx.reload(&rule).await.scheduled_date, date(2024, 10, 1));
        assert_eq!(fx.occurrences.count_for_rule(&rule.id).await.unwrap(), 4);
        assert_eq!(fx.balance().await, Decimal::from(-200));
    }

    #[tokio::test]
    async fn test_stale_edit_cannot_rewind_schedule() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let rule = fx
            .add_rule(RuleKind::Debit, Decimal::from(50), Frequency::Monthly, date(2024, 6, 1), None)
            .await;

        let mut stale = fx.reload(&rule).await;
        fx.batch(date(2024, 6, 1)).await;

        stale.amount = Decimal::from(60);
        let err = fx.rules.update_rule(&stale, stale.scheduled_date).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(fx.reload(&rule).await.scheduled_date, date(2024, 7, 1));

        for day in [date(2024, 7, 1), date(2024, 8, 1)] {
            assert_eq!(fx.batch(day).await.total, 1);
        }
        assert_eq!(fx.balance().await, Decimal::from(850));
    }

    #[tokio::test]
    async fn test_batch_records_one_task_run() {
        let fx = setup_test(date(2024, 6, 1)).await;
        fx.add_rule(RuleKind::Debit, Decimal::from(10), Frequency::Weekly, date(2024, 6, 1), None)
            .await;
        fx.add_rule(RuleKind::Income, Decimal::from(10), Frequency::Weekly, date(2024, 6, 1), None)
            .await;

        let scheduled = fx.batch(date(2024, 6, 1)).await;
        let manual = fx
            .processor
            .run_daily_batch(date(2024, 6, 8), BatchTrigger::Manual, Some("user::admin".to_string()))
            .await
            .unwrap();

        let runs = fx.audit.list_recent(10).await.unwrap();
        assert_eq!(runs.len(), 2);

        let scheduled_run = fx.audit.get(scheduled.task_run_id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(scheduled_run.kind, TaskKind::CombinedBatch);
        assert_eq!(scheduled_run.applied_count, 2);
        assert_eq!(scheduled_run.executed_on, date(2024, 6, 1));
        assert_eq!(scheduled_run.details["applied_debits"], 1);

        let manual_run = fx.audit.get(manual.task_run_id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(manual_run.kind, TaskKind::ManualTrigger);
        assert_eq!(manual_run.created_by.as_deref(), Some("user::admin"));
        assert_eq!(manual_run.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_empty_batch_still_records_run() {
        let fx = setup_test(date(2024, 6, 1)).await;

        let summary = fx.batch(date(2024, 6, 1)).await;

        assert_eq!(summary.total, 0);
        assert_eq!(summary.status, TaskStatus::Success);
        assert!(summary.task_run_id.is_some());
    }

    #[tokio::test]
    async fn test_record_immediate_if_due() {
        let fx = setup_test(date(2024, 6, 10)).await;
        let due = fx
            .add_rule(RuleKind::Income, Decimal::from(120), Frequency::Monthly, date(2024, 6, 5), None)
            .await;
        let future = fx
            .add_rule(RuleKind::Debit, Decimal::from(30), Frequency::Monthly, date(2024, 6, 11), None)
            .await;

        let summary = fx.processor.record_immediate_if_due(&due).await.unwrap().unwrap();
        assert_eq!(summary.applied_incomes, 1);
        assert_eq!(summary.as_of, date(2024, 6, 10));
        let run = fx.audit.get(summary.task_run_id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(run.kind, TaskKind::IncomeBatch);

        assert_eq!(fx.reload(&due).await.scheduled_date, date(2024, 7, 5));
        assert!(fx.processor.record_immediate_if_due(&due).await.unwrap().is_none());
        assert!(fx.processor.record_immediate_if_due(&future).await.unwrap().is_none());

        assert_eq!(fx.audit.list_recent(10).await.unwrap().len(), 1);
        assert_eq!(fx.balance().await, Decimal::from(1120));
    }

    #[tokio::test]
    async fn test_run_today_uses_clock() {
        let fx = setup_test(date(2024, 3, 15)).await;
        fx.add_rule(RuleKind::Debit, Decimal::from(1), Frequency::Yearly, date(2024, 3, 15), None)
            .await;

        let summary = fx.processor.run_today(BatchTrigger::Scheduled, None).await.unwrap();

        assert_eq!(summary.as_of, date(2024, 3, 15));
        assert_eq!(summary.total, 1);
    }

    #[tokio::test]
    async fn test_daily_batches_keep_balance_and_schedule_consistent() {
        let fx = setup_test(date(2024, 1, 1)).await;
        let weekly = fx
            .add_rule(RuleKind::Debit, Decimal::from(10), Frequency::Weekly, date(2024, 1, 1), None)
            .await;
        let monthly = fx
            .add_rule(RuleKind::Income, Decimal::from(100), Frequency::Monthly, date(2024, 1, 31), None)
            .await;

        let mut previous = (weekly.scheduled_date, monthly.scheduled_date);
        let mut day = date(2024, 1, 1);
        while day <= date(2024, 3, 31) {
            fx.batch(day).await;
            let current = (fx.reload(&weekly).await.scheduled_date, fx.reload(&monthly).await.scheduled_date);
            assert!(current.0 >= previous.0 && current.1 >= previous.1, "schedule moved backwards on {}", day);
            previous = current;
            day = day.succ_opt().unwrap();
        }

        // Jan 1 .. Mar 25 weekly, Jan 31 / Feb 29 / Mar 29 monthly
        assert_eq!(fx.occurrences.count_for_rule(&weekly.id).await.unwrap(), 13);
        assert_eq!(fx.occurrences.count_for_rule(&monthly.id).await.unwrap(), 3);

        let balance = fx.balance().await;
        assert_eq!(balance, Decimal::from(1170));
        let entries_total: Decimal = fx
            .entries
            .list_entries(&fx.account.id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.amount)
            .sum();
        assert_eq!(balance, fx.account.opening_balance + entries_total);
    }

    #[tokio::test]
    async fn test_overlapping_batches_on_one_pool_apply_once() {
        let fx = setup_test(date(2024, 6, 1)).await;
        let rule = fx
            .add_rule(RuleKind::Debit, Decimal::from(60), Frequency::Monthly, date(2024, 6, 1), None)
            .await;

        let (a, b) = tokio::join!(fx.batch(date(2024, 6, 1)), fx.batch(date(2024, 6, 1)));

        assert_eq!(a.total + b.total, 1);
        assert_eq!(fx.occurrences.count_for_rule(&rule.id).await.unwrap(), 1);
        assert_eq!(fx.balance().await, Decimal::from(940));
    }

    #[tokio::test]
    async fn test_overlapping_batches_on_separate_pools_apply_once() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let url = format!("sqlite:{}", dir.path().join("ledger.db").display());
        let first_db = Arc::new(DbConnection::new(&url).await.unwrap());
        let second_db = Arc::new(DbConnection::new(&url).await.unwrap());

        let account = Account::open("user::alice", "Checking", Decimal::from(1000));
        AccountRepository::new((*first_db).clone()).store_account(&account).await.unwrap();
        let rule = RecurrenceRule::new(
            &account.id,
            RuleKind::Income,
            Decimal::from(500),
            "Salary",
            Frequency::Monthly,
            date(2024, 6, 1),
            None,
        );
        let rules = RecurrenceRepository::new((*first_db).clone());
        rules.store_rule(&rule).await.unwrap();

        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(date(2024, 6, 1)));
        let first = TransactionProcessor::new(first_db.clone(), clock.clone());
        let second = TransactionProcessor::new(second_db, clock);

        let (a, b) = tokio::join!(
            first.run_daily_batch(date(2024, 6, 1), BatchTrigger::Scheduled, None),
            second.run_daily_batch(date(2024, 6, 1), BatchTrigger::Scheduled, None)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        // The loser either sees the occurrence or fails on the lock and stays due
        assert_eq!(a.total + b.total, 1);
        let occurrences = OccurrenceRepository::new((*first_db).clone());
        assert_eq!(occurrences.count_for_rule(&rule.id).await.unwrap(), 1);
        let stored = AccountRepository::new((*first_db).clone())
            .get_account(&account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.balance, Decimal::from(1500));
        assert_eq!(rules.get_rule(&rule.id).await.unwrap().unwrap().scheduled_date, date(2024, 7, 1));
    }
}
