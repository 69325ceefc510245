//! Borrow record model and the derived loan status

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::fee::{Fee, FineAssessment};

/// Borrow record from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    /// Fine accrued on this loan so far
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub fine: Decimal,
    /// Overdue days already turned into fee rows
    pub billed_days: i32,
}

/// Loan status, derived from the timestamps at read time and never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl BorrowRecord {
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now > self.due_at
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> LoanStatus {
        if !self.is_active() {
            LoanStatus::Returned
        } else if now > self.due_at {
            LoanStatus::Overdue
        } else {
            LoanStatus::Active
        }
    }

    /// Whole days past due at `now`, 0 when not late
    pub fn days_overdue_at(&self, now: DateTime<Utc>) -> i64 {
        days_overdue(self.due_at, now)
    }
}

/// Whole days between `due_at` and `now`, rounded down; 0 when `now` is not past due
pub fn days_overdue(due_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now <= due_at {
        0
    } else {
        // num_days truncates, which is floor for a positive duration
        (now - due_at).num_days()
    }
}

/// Due date for a loan starting at `borrowed_at`
pub fn due_date(borrowed_at: DateTime<Utc>, loan_period_days: i64) -> DateTime<Utc> {
    borrowed_at + Duration::days(loan_period_days)
}

/// Borrow record joined with the book and borrower names
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LoanRow {
    #[sqlx(flatten)]
    pub record: BorrowRecord,
    pub book_title: String,
    pub book_author: String,
    pub user_fullname: String,
}

/// Loan with full details for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub user_id: i32,
    pub user_fullname: String,
    pub book_id: i32,
    pub book_title: String,
    pub book_author: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub fine: Decimal,
    pub status: LoanStatus,
    pub is_overdue: bool,
    pub days_overdue: i64,
    /// Negative once the loan is late; absent for returned loans
    pub days_until_due: Option<i64>,
}

impl LoanDetails {
    /// Build the display form, evaluating the status against `now`
    pub fn from_row(row: LoanRow, now: DateTime<Utc>) -> Self {
        let record = row.record;
        let status = record.status_at(now);
        let days_until_due = record
            .is_active()
            .then(|| (record.due_at - now).num_days());

        Self {
            id: record.id,
            user_id: record.user_id,
            user_fullname: row.user_fullname,
            book_id: record.book_id,
            book_title: row.book_title,
            book_author: row.book_author,
            borrowed_at: record.borrowed_at,
            due_at: record.due_at,
            returned_at: record.returned_at,
            fine: record.fine,
            status,
            is_overdue: status == LoanStatus::Overdue,
            days_overdue: if record.is_active() {
                record.days_overdue_at(now)
            } else {
                0
            },
            days_until_due,
        }
    }
}

/// Which borrow records to list
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoanFilter {
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    pub active_only: bool,
    /// Active records whose due date is before this instant
    pub overdue_at: Option<DateTime<Utc>>,
}

/// Result of a return, as committed
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnOutcome {
    pub record: BorrowRecord,
    pub book_title: String,
    pub assessment: FineAssessment,
    pub fee: Option<Fee>,
}

/// Borrow/return/overdue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoanCounts {
    pub total: i64,
    pub active: i64,
    pub overdue: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(due_at: DateTime<Utc>, returned_at: Option<DateTime<Utc>>) -> BorrowRecord {
        BorrowRecord {
            id: 1,
            user_id: 1,
            book_id: 1,
            borrowed_at: due_at - Duration::days(14),
            due_at,
            returned_at,
            fine: Decimal::ZERO,
            billed_days: 0,
        }
    }

    #[test]
    fn test_days_overdue_rounds_down() {
        let due = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(days_overdue(due, due), 0);
        assert_eq!(days_overdue(due, due - Duration::days(3)), 0);
        assert_eq!(days_overdue(due, due + Duration::hours(23)), 0);
        assert_eq!(days_overdue(due, due + Duration::hours(24)), 1);
        assert_eq!(days_overdue(due, due + Duration::hours(5 * 24 + 20)), 5);
    }

    #[test]
    fn test_status_is_derived_from_now() {
        let due = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let active = record(due, None);
        assert_eq!(active.status_at(due - Duration::days(1)), LoanStatus::Active);
        assert_eq!(active.status_at(due), LoanStatus::Active);
        assert_eq!(active.status_at(due + Duration::seconds(1)), LoanStatus::Overdue);

        let returned = record(due, Some(due + Duration::days(2)));
        assert_eq!(returned.status_at(due + Duration::days(30)), LoanStatus::Returned);
        assert!(!returned.is_overdue_at(due + Duration::days(30)));
    }

    #[test]
    fn test_due_date_adds_loan_period() {
        let borrowed = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
        assert_eq!(
            due_date(borrowed, 14),
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_details_for_late_loan() {
        let due = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let row = LoanRow {
            record: record(due, None),
            book_title: "Dune".to_string(),
            book_author: "Frank Herbert".to_string(),
            user_fullname: "Ada Lovelace".to_string(),
        };
        let details = LoanDetails::from_row(row, due + Duration::days(3));
        assert!(details.is_overdue);
        assert_eq!(details.status, LoanStatus::Overdue);
        assert_eq!(details.days_overdue, 3);
        assert_eq!(details.days_until_due, Some(-3));
    }
}
