//! Month-by-month simulation of an account's future balance.
//!
//! Reads the account and its active rules, never writes. The simulation
//! itself is a pure function of those inputs.

use chrono::{Days, Months};
use log::info;
use rust_decimal::Decimal;
use shared::{AccountProjection, MonthProjection, ProjectedOccurrence, ProjectionTotals, RuleKind};
use std::sync::Arc;

use crate::backend::domain::commands::projection::ProjectAccountCommand;
use crate::backend::domain::errors::ProjectionError;
use crate::backend::domain::models::{Account, RecurrenceRule};
use crate::backend::storage::{AccountRepository, DbConnection, RecurrenceRepository};

pub const MIN_PROJECTION_MONTHS: u32 = 1;
pub const MAX_PROJECTION_MONTHS: u32 = 60;

#[derive(Clone)]
pub struct ProjectionService {
    account_repository: AccountRepository,
    recurrence_repository: RecurrenceRepository,
}

impl ProjectionService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        let account_repository = AccountRepository::new((*db).clone());
        let recurrence_repository = RecurrenceRepository::new((*db).clone());
        Self {
            account_repository,
            recurrence_repository,
        }
    }

    /// Project an account from its current balance
    pub async fn project(&self, command: ProjectAccountCommand) -> Result<AccountProjection, ProjectionError> {
        check_months(command.months)?;

        let account = self
            .account_repository
            .get_account(&command.account_id)
            .await?
            .ok_or_else(|| ProjectionError::UnknownAccount(command.account_id.clone()))?;
        let rules = self
            .recurrence_repository
            .list_active_rules_for_account(&account.id)
            .await?;

        let projection = build_projection(&account, &rules, &command)?;
        info!(
            "Projected account {} over {} months from {}: final balance {}, {} negative months",
            account.id, projection.months, projection.start_date, projection.final_balance, projection.totals.negative_months
        );
        Ok(projection)
    }
}

fn check_months(months: u32) -> Result<(), ProjectionError> {
    if !(MIN_PROJECTION_MONTHS..=MAX_PROJECTION_MONTHS).contains(&months) {
        return Err(ProjectionError::MonthsOutOfRange {
            months,
            min: MIN_PROJECTION_MONTHS,
            max: MAX_PROJECTION_MONTHS,
        });
    }
    Ok(())
}

/// Simulate `command.months` calendar months starting at `command.start_date`.
///
/// Month `i` covers `[start + (i-1) months, start + i months)`. Each month
/// opens at the previous month's closing balance, the first at the account's
/// current balance.
pub fn build_projection(
    account: &Account,
    rules: &[RecurrenceRule],
    command: &ProjectAccountCommand,
) -> Result<AccountProjection, ProjectionError> {
    check_months(command.months)?;
    let start = command.start_date;
    let out_of_range = || ProjectionError::DateOutOfRange(start);

    let mut boundaries = Vec::with_capacity(command.months as usize + 1);
    for offset in 0..=command.months {
        boundaries.push(start.checked_add_months(Months::new(offset)).ok_or_else(out_of_range)?);
    }
    let horizon_end = boundaries[boundaries.len() - 1]
        .checked_sub_days(Days::new(1))
        .ok_or_else(out_of_range)?;

    let mut occurrences: Vec<ProjectedOccurrence> = rules
        .iter()
        .filter(|rule| rule.active && rule.account_id == account.id)
        .filter(|rule| match rule.kind {
            RuleKind::Debit => command.include_debits,
            RuleKind::Income => command.include_incomes,
        })
        .flat_map(|rule| {
            rule.occurrences_until(start, horizon_end)
                .into_iter()
                .map(move |occurrence| ProjectedOccurrence {
                    date: occurrence.date,
                    amount: occurrence.amount,
                    description: occurrence.description,
                    kind: rule.kind,
                    rule_id: rule.id.clone(),
                })
        })
        .collect();
    occurrences.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.rule_id.cmp(&b.rule_id)));

    let mut monthly = Vec::with_capacity(command.months as usize);
    let mut pending = occurrences.into_iter().peekable();
    let mut balance = account.balance;

    for (index, window) in boundaries.windows(2).enumerate() {
        let (month_start, next_start) = (window[0], window[1]);
        let mut month_occurrences = Vec::new();
        while let Some(occurrence) = pending.next_if(|o| o.date < next_start) {
            month_occurrences.push(occurrence);
        }

        let total_income: Decimal = month_occurrences
            .iter()
            .filter(|o| o.kind == RuleKind::Income)
            .map(|o| o.amount)
            .sum();
        let total_debit: Decimal = month_occurrences
            .iter()
            .filter(|o| o.kind == RuleKind::Debit)
            .map(|o| o.amount.abs())
            .sum();
        let opening_balance = balance;
        let closing_balance = opening_balance + month_occurrences.iter().map(|o| o.amount).sum::<Decimal>();
        balance = closing_balance;

        monthly.push(MonthProjection {
            month: index as u32 + 1,
            start_date: month_start,
            end_date: next_start.checked_sub_days(Days::new(1)).ok_or_else(out_of_range)?,
            opening_balance,
            closing_balance,
            total_income,
            total_debit,
            variation: total_income - total_debit,
            occurrences: month_occurrences,
        });
    }

    let totals = ProjectionTotals {
        total_income: monthly.iter().map(|m| m.total_income).sum(),
        total_debit: monthly.iter().map(|m| m.total_debit).sum(),
        minimum_balance: monthly.iter().map(|m| m.closing_balance).min().unwrap_or(account.balance),
        maximum_balance: monthly.iter().map(|m| m.closing_balance).max().unwrap_or(account.balance),
        negative_months: monthly.iter().filter(|m| m.closing_balance < Decimal::ZERO).count() as u32,
    };

    Ok(AccountProjection {
        account_id: account.id.clone(),
        account_name: account.name.clone(),
        initial_balance: account.balance,
        final_balance: balance,
        total_variation: balance - account.balance,
        start_date: start,
        end_date: boundaries[boundaries.len() - 1],
        months: command.months,
        monthly,
        totals,
    })
}
