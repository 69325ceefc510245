//! Fees and the overdue fine policy

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::config::LoansConfig;

use super::loan::{due_date, BorrowRecord};

/// Fee model from database. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fee {
    pub id: i32,
    pub user_id: i32,
    pub borrow_record_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub reason: String,
}

/// Fee joined with the name of the user it is charged to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FeeDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fee: Fee,
    pub user_fullname: String,
}

/// Loan period and linear per-day fine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinePolicy {
    pub loan_period_days: i64,
    pub rate_per_day: Decimal,
}

/// Fine owed by one record at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineAssessment {
    pub days_overdue: i64,
    /// Fine for the whole overdue period
    pub total: Decimal,
    /// Overdue days not yet covered by a fee row
    pub unbilled_days: i64,
    /// Amount to charge now
    pub charge: Decimal,
}

impl FineAssessment {
    pub fn is_chargeable(&self) -> bool {
        self.charge > Decimal::ZERO
    }
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            rate_per_day: Decimal::ONE,
        }
    }
}

impl From<&LoansConfig> for FinePolicy {
    fn from(config: &LoansConfig) -> Self {
        Self {
            loan_period_days: config.loan_period_days,
            rate_per_day: config.fine_rate_per_day,
        }
    }
}

impl FinePolicy {
    pub fn due_date(&self, borrowed_at: DateTime<Utc>) -> DateTime<Utc> {
        due_date(borrowed_at, self.loan_period_days)
    }

    pub fn fine_for_days(&self, days: i64) -> Decimal {
        self.rate_per_day * Decimal::from(days.max(0))
    }

    /// Assess a record at `now`. Days already billed are never charged again.
    pub fn assess(&self, record: &BorrowRecord, now: DateTime<Utc>) -> FineAssessment {
        let days_overdue = record.days_overdue_at(now);
        let unbilled_days = (days_overdue - i64::from(record.billed_days)).max(0);

        FineAssessment {
            days_overdue,
            total: self.fine_for_days(days_overdue),
            unbilled_days,
            charge: self.fine_for_days(unbilled_days),
        }
    }

    /// Apply an assessment to a record: accrued fine and billing marker move forward, never back
    pub fn settle(&self, record: &mut BorrowRecord, assessment: &FineAssessment) {
        if assessment.total > record.fine {
            record.fine = assessment.total;
        }
        let days = i32::try_from(assessment.days_overdue).unwrap_or(i32::MAX);
        if days > record.billed_days {
            record.billed_days = days;
        }
    }
}

/// Fee reason for a book returned late
pub fn late_return_reason(book_title: &str) -> String {
    format!("Late return for book: {}", book_title)
}

/// Fee reason for a sweep charge on a book still out
pub fn overdue_reason(book_title: &str, from_day: i64, to_day: i64) -> String {
    if from_day == to_day {
        format!("Overdue fine for book: {} (day {})", book_title, to_day)
    } else {
        format!(
            "Overdue fine for book: {} (days {}-{})",
            book_title, from_day, to_day
        )
    }
}

/// Outcome of one fine sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Overdue records examined
    pub overdue_records: usize,
    /// Fee rows created
    pub fees_created: usize,
    /// Sum of the fee rows created
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_charged: Decimal,
}
