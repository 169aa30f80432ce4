//! Budget view of an account: monthly equivalents of its active rules, what is
//! coming up soon, and what the processor has applied recently.

use anyhow::{anyhow, Result};
use chrono::{Days, NaiveDate};
use log::info;
use rust_decimal::Decimal;
use shared::{AutomaticTransactionSummary, BudgetSummary, RuleKind, UpcomingOccurrence};
use std::sync::Arc;

use crate::backend::domain::clock::Clock;
use crate::backend::storage::{AccountRepository, DbConnection, OccurrenceRepository, RecurrenceRepository};

/// How far ahead upcoming occurrences are listed
pub const UPCOMING_WINDOW_DAYS: u64 = 30;
/// Default look-back of the automatic transaction summary
pub const DEFAULT_SUMMARY_DAYS: u64 = 30;

#[derive(Clone)]
pub struct BudgetSummaryService {
    account_repository: AccountRepository,
    recurrence_repository: RecurrenceRepository,
    occurrence_repository: OccurrenceRepository,
    clock: Arc<dyn Clock>,
}

impl BudgetSummaryService {
    pub fn new(db: Arc<DbConnection>, clock: Arc<dyn Clock>) -> Self {
        Self {
            account_repository: AccountRepository::new((*db).clone()),
            recurrence_repository: RecurrenceRepository::new((*db).clone()),
            occurrence_repository: OccurrenceRepository::new((*db).clone()),
            clock,
        }
    }

    pub async fn summarize(&self, account_id: &str) -> Result<BudgetSummary> {
        let today = self.clock.today();
        let account = self
            .account_repository
            .get_account(account_id)
            .await?
            .ok_or_else(|| anyhow!("Account {} not found", account_id))?;
        let rules: Vec<_> = self
            .recurrence_repository
            .list_active_rules_for_account(account_id)
            .await?
            .into_iter()
            .filter(|rule| !rule.is_expired(today))
            .collect();

        let mut summary = BudgetSummary {
            account_id: account.id.clone(),
            current_balance: account.balance,
            active_debits: 0,
            active_incomes: 0,
            monthly_debits: Decimal::ZERO,
            monthly_incomes: Decimal::ZERO,
            estimated_monthly_net: Decimal::ZERO,
            positive: true,
            upcoming: Vec::new(),
        };

        let window_end = today
            .checked_add_days(Days::new(UPCOMING_WINDOW_DAYS))
            .ok_or_else(|| anyhow!("Date {} is out of range", today))?;

        for rule in &rules {
            let monthly = rule.frequency.monthly_equivalent(rule.amount);
            match rule.kind {
                RuleKind::Debit => {
                    summary.active_debits += 1;
                    summary.monthly_debits += monthly;
                }
                RuleKind::Income => {
                    summary.active_incomes += 1;
                    summary.monthly_incomes += monthly;
                }
            }

            summary
                .upcoming
                .extend(rule.occurrences_until(today, window_end).into_iter().map(|occurrence| UpcomingOccurrence {
                    rule_id: rule.id.clone(),
                    kind: rule.kind,
                    description: occurrence.description,
                    amount: occurrence.amount,
                    date: occurrence.date,
                    days_remaining: (occurrence.date - today).num_days(),
                }));
        }

        summary.monthly_debits = summary.monthly_debits.round_dp(2);
        summary.monthly_incomes = summary.monthly_incomes.round_dp(2);
        summary.estimated_monthly_net = summary.monthly_incomes - summary.monthly_debits;
        summary.positive = summary.estimated_monthly_net >= Decimal::ZERO;
        summary.upcoming.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.rule_id.cmp(&b.rule_id)));

        info!(
            "Budget for account {}: {} debits, {} incomes, estimated monthly net {}",
            account.id, summary.active_debits, summary.active_incomes, summary.estimated_monthly_net
        );
        Ok(summary)
    }

    /// Applied automatic occurrences within `[start, end]`.
    ///
    /// `end` defaults to today and `start` to `DEFAULT_SUMMARY_DAYS` before `end`.
    pub async fn automatic_summary(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<AutomaticTransactionSummary> {
        let end = end.unwrap_or_else(|| self.clock.today());
        let start = match start {
            Some(start) => start,
            None => end
                .checked_sub_days(Days::new(DEFAULT_SUMMARY_DAYS))
                .ok_or_else(|| anyhow!("Date {} is out of range", end))?,
        };

        let occurrences = self
            .occurrence_repository
            .list_for_account_between(account_id, start, end)
            .await?;

        let mut summary = AutomaticTransactionSummary {
            account_id: account_id.to_string(),
            start_date: start,
            end_date: end,
            total_transactions: 0,
            debits_count: 0,
            incomes_count: 0,
            debits_total: Decimal::ZERO,
            incomes_total: Decimal::ZERO,
            net_impact: Decimal::ZERO,
        };
        for occurrence in &occurrences {
            summary.total_transactions += 1;
            match occurrence.rule_kind {
                RuleKind::Debit => {
                    summary.debits_count += 1;
                    summary.debits_total += occurrence.amount;
                }
                RuleKind::Income => {
                    summary.incomes_count += 1;
                    summary.incomes_total += occurrence.amount;
                }
            }
        }
        summary.net_impact = summary.debits_total + summary.incomes_total;
        Ok(summary)
    }
}
