//! Loan management service: borrow, return, overdue queries and the fine sweep
//!
//! Every entry point that acts on behalf of a user runs the authorization
//! gate before touching a store.

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        fee::{FeeDetails, FinePolicy, SweepReport},
        loan::{BorrowRecord, LoanDetails, LoanFilter, ReturnOutcome},
        user::{Access, UserClaims},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    policy: FinePolicy,
}

impl LoansService {
    pub fn new(repository: Repository, policy: FinePolicy) -> Self {
        Self { repository, policy }
    }

    /// Borrow a book for `user_id` (the caller when None)
    pub async fn borrow(
        &self,
        claims: &UserClaims,
        user_id: Option<i32>,
        book_id: i32,
    ) -> AppResult<BorrowRecord> {
        self.borrow_at(claims, user_id, book_id, Utc::now()).await
    }

    pub async fn borrow_at(
        &self,
        claims: &UserClaims,
        user_id: Option<i32>,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let user_id = claims.acting_for(user_id)?;

        let record = self
            .repository
            .loans
            .borrow(user_id, book_id, now, self.policy.due_date(now))
            .await?;

        tracing::info!(
            record_id = record.id,
            user_id,
            book_id,
            due_at = %record.due_at,
            "Book borrowed"
        );
        Ok(record)
    }

    /// Return a book held by `user_id` (the caller when None)
    pub async fn return_book(
        &self,
        claims: &UserClaims,
        user_id: Option<i32>,
        book_id: i32,
    ) -> AppResult<ReturnOutcome> {
        self.return_book_at(claims, user_id, book_id, Utc::now()).await
    }

    pub async fn return_book_at(
        &self,
        claims: &UserClaims,
        user_id: Option<i32>,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<ReturnOutcome> {
        let user_id = claims.acting_for(user_id)?;

        let outcome = self
            .repository
            .loans
            .return_book(user_id, book_id, now, self.policy)
            .await?;

        tracing::info!(
            record_id = outcome.record.id,
            user_id,
            book_id,
            days_overdue = outcome.assessment.days_overdue,
            fine = %outcome.assessment.total,
            charged = %outcome.assessment.charge,
            "Book returned"
        );
        Ok(outcome)
    }

    /// Active loans of a user
    pub async fn user_loans(&self, claims: &UserClaims, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        claims.authorize(Access::Owner(user_id))?;
        self.repository.users.get_by_id(user_id).await?;
        self.details(LoanFilter {
            user_id: Some(user_id),
            active_only: true,
            ..Default::default()
        })
        .await
    }

    /// Every loan of a user, returned ones included
    pub async fn user_history(&self, claims: &UserClaims, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        claims.authorize(Access::Owner(user_id))?;
        self.repository.users.get_by_id(user_id).await?;
        self.details(LoanFilter {
            user_id: Some(user_id),
            ..Default::default()
        })
        .await
    }

    /// Overdue loans of a user, evaluated against the current time
    pub async fn user_overdue(&self, claims: &UserClaims, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        claims.authorize(Access::Owner(user_id))?;
        self.repository.users.get_by_id(user_id).await?;
        self.details(LoanFilter {
            user_id: Some(user_id),
            overdue_at: Some(Utc::now()),
            ..Default::default()
        })
        .await
    }

    /// Every loan in the library
    pub async fn all_loans(&self, claims: &UserClaims, active_only: bool) -> AppResult<Vec<LoanDetails>> {
        claims.require_admin()?;
        self.details(LoanFilter {
            active_only,
            ..Default::default()
        })
        .await
    }

    /// Every overdue loan in the library
    pub async fn all_overdue(&self, claims: &UserClaims) -> AppResult<Vec<LoanDetails>> {
        claims.require_admin()?;
        self.details(LoanFilter {
            overdue_at: Some(Utc::now()),
            ..Default::default()
        })
        .await
    }

    /// Fees charged to a user, newest first
    pub async fn user_fees(&self, claims: &UserClaims, user_id: i32) -> AppResult<Vec<FeeDetails>> {
        claims.authorize(Access::Owner(user_id))?;
        self.repository.users.get_by_id(user_id).await?;
        self.repository.fees.list(Some(user_id)).await
    }

    pub async fn all_fees(&self, claims: &UserClaims) -> AppResult<Vec<FeeDetails>> {
        claims.require_admin()?;
        self.repository.fees.list(None).await
    }

    /// Manually triggered fine sweep
    pub async fn sweep_fines(&self, claims: &UserClaims) -> AppResult<SweepReport> {
        claims.require_admin()?;
        self.run_fine_sweep(Utc::now()).await
    }

    /// Bill every overdue active loan up to `now`
    pub async fn run_fine_sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let report = self.repository.loans.bill_overdue(now, self.policy).await?;
        if report.fees_created > 0 {
            tracing::info!(
                overdue = report.overdue_records,
                fees = report.fees_created,
                total = %report.total_charged,
                "Fine sweep billed overdue loans"
            );
        } else {
            tracing::debug!(overdue = report.overdue_records, "Fine sweep found nothing to bill");
        }
        Ok(report)
    }

    async fn details(&self, filter: LoanFilter) -> AppResult<Vec<LoanDetails>> {
        let now = Utc::now();
        let rows = self.repository.loans.list(filter).await?;
        Ok(rows
            .into_iter()
            .map(|row| LoanDetails::from_row(row, now))
            .collect())
    }
}
