use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{Frequency, RuleKind};

/// Longest description accepted for a rule
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// A declarative automatic debit or recurring income attached to an account.
///
/// `scheduled_date` always points at the next occurrence that has not been
/// applied yet. It only moves forward, through the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: String,
    pub account_id: String,
    pub kind: RuleKind,
    /// Magnitude of each occurrence, never negative
    pub amount: Decimal,
    pub description: String,
    pub frequency: Frequency,
    pub scheduled_date: NaiveDate,
    /// Inclusive last date an occurrence may fall on
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    /// Free-form income category such as "Salary" (incomes only)
    pub income_type: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One concrete dated instance of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub date: NaiveDate,
    /// Negative for debits, positive for incomes
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleValidationError {
    #[error("Amount cannot be negative")]
    NegativeAmount,
    #[error("Description cannot be empty")]
    EmptyDescription,
    #[error("Description is too long")]
    DescriptionTooLong,
    #[error("End date {end} is before scheduled date {scheduled}")]
    EndBeforeScheduled { scheduled: NaiveDate, end: NaiveDate },
    #[error("Scheduled date cannot move back from {current} to {requested}")]
    ScheduleMovedBackwards { current: NaiveDate, requested: NaiveDate },
}

/// Lazy walk over the dates a rule produces, starting at its scheduled date
/// and stopping after its end date.
#[derive(Debug, Clone)]
pub struct Schedule {
    frequency: Frequency,
    next: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl Iterator for Schedule {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        if self.end_date.is_some_and(|end| current > end) {
            self.next = None;
            return None;
        }
        self.next = self.frequency.advance(current);
        Some(current)
    }
}

impl RecurrenceRule {
    /// Generate a rule ID
    pub fn generate_id(kind: RuleKind) -> String {
        format!("rule::{}::{}", kind, uuid::Uuid::new_v4())
    }

    /// Build a new active rule stamped with the current time
    pub fn new(
        account_id: &str,
        kind: RuleKind,
        amount: Decimal,
        description: &str,
        frequency: Frequency,
        scheduled_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Self::generate_id(kind),
            account_id: account_id.to_string(),
            kind,
            amount,
            description: description.to_string(),
            frequency,
            scheduled_date,
            end_date,
            active: true,
            income_type: None,
            created_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Amount carried by each occurrence, signed by the rule kind
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }

    /// Description written on the ledger entry booked for an occurrence
    pub fn entry_description(&self) -> String {
        match (self.kind, self.income_type.as_deref()) {
            (RuleKind::Debit, _) => format!("Automatic debit - {}", self.description),
            (RuleKind::Income, Some(income_type)) if !income_type.is_empty() => {
                format!("Automatic income - {} - {}", income_type, self.description)
            }
            (RuleKind::Income, _) => format!("Automatic income - {}", self.description),
        }
    }

    /// Idempotency key of the occurrence the rule currently points at
    pub fn source_id(&self) -> String {
        format!("{}:{}:{}", self.kind, self.id, self.scheduled_date)
    }

    /// Dates produced by the rule from its scheduled date onwards
    pub fn schedule(&self) -> Schedule {
        Schedule {
            frequency: self.frequency,
            next: Some(self.scheduled_date),
            end_date: self.end_date,
        }
    }

    /// First scheduled date strictly after both the current scheduled date and `after`.
    ///
    /// Returns `None` once the candidate would fall after the end date.
    pub fn next_occurrence(&self, after: NaiveDate) -> Option<NaiveDate> {
        let floor = self.scheduled_date.max(after);
        self.schedule().find(|date| *date > floor)
    }

    /// Every occurrence dated within `[today, end]`, in date order.
    ///
    /// Pure: calling it twice on the same rule gives the same result.
    pub fn occurrences_until(&self, today: NaiveDate, end: NaiveDate) -> Vec<Occurrence> {
        let amount = self.signed_amount();
        self.schedule()
            .take_while(|date| *date <= end)
            .filter(|date| *date >= today)
            .map(|date| Occurrence {
                date,
                amount,
                description: self.description.clone(),
            })
            .collect()
    }

    /// Whether the rule can still produce an occurrence on or after `as_of`
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| end < as_of)
    }

    /// Whether the batch for `as_of` should apply this rule
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.active && self.scheduled_date <= as_of && !self.is_expired(as_of)
    }

    /// Check the invariants every stored rule must hold
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        if self.amount < Decimal::ZERO {
            return Err(RuleValidationError::NegativeAmount);
        }
        if self.description.trim().is_empty() {
            return Err(RuleValidationError::EmptyDescription);
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(RuleValidationError::DescriptionTooLong);
        }
        if let Some(end) = self.end_date {
            if end < self.scheduled_date {
                return Err(RuleValidationError::EndBeforeScheduled {
                    scheduled: self.scheduled_date,
                    end,
                });
            }
        }
        Ok(())
    }
}
