//! Loans repository: the transactional borrow/return/billing writes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        fee::{late_return_reason, overdue_reason, Fee, FinePolicy, SweepReport},
        loan::{BorrowRecord, LoanCounts, LoanFilter, LoanRow, ReturnOutcome},
        stats::{ActiveUser, PopularBook},
    },
};

use super::unique_violation_as_conflict;

pub const ALREADY_BORROWED: &str = "You already have this book";
pub const NOT_AVAILABLE: &str = "Book not available";
pub const NOT_BORROWED: &str = "Book not found in your borrowed list";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoansRepository: Send + Sync {
    /// Create a borrow record and take one copy off the shelf, atomically
    async fn borrow(
        &self,
        user_id: i32,
        book_id: i32,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<BorrowRecord>;

    /// Close the active record for (user, book), put the copy back and bill
    /// the unbilled overdue days, atomically
    async fn return_book(
        &self,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
        policy: FinePolicy,
    ) -> AppResult<ReturnOutcome>;

    /// Bill every overdue active record up to `now`. Idempotent for a given `now`.
    async fn bill_overdue(&self, now: DateTime<Utc>, policy: FinePolicy) -> AppResult<SweepReport>;

    async fn list(&self, filter: LoanFilter) -> AppResult<Vec<LoanRow>>;

    async fn counts(&self, user_id: Option<i32>, now: DateTime<Utc>) -> AppResult<LoanCounts>;

    async fn popular_books(&self, limit: i64) -> AppResult<Vec<PopularBook>>;

    async fn active_users(&self, limit: i64) -> AppResult<Vec<ActiveUser>>;
}

#[derive(Clone)]
pub struct PgLoansRepository {
    pool: Pool<Postgres>,
}

impl PgLoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

const LOAN_ROW_SELECT: &str = r#"
    SELECT r.*, b.title AS book_title, b.author AS book_author, u.fullname AS user_fullname
    FROM borrow_records r
    JOIN books b ON b.id = r.book_id
    JOIN users u ON u.id = r.user_id
"#;

#[async_trait]
impl LoansRepository for PgLoansRepository {
    async fn borrow(
        &self,
        user_id: i32,
        book_id: i32,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let mut tx = self.pool.begin().await?;

        let user_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !user_exists {
            return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
        }

        // Row lock serializes concurrent borrows of the same title
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        if !book.is_available() {
            return Err(AppError::Conflict(NOT_AVAILABLE.to_string()));
        }

        let already_borrowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrow_records WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL)",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_borrowed {
            return Err(AppError::Conflict(ALREADY_BORROWED.to_string()));
        }

        let decremented = sqlx::query(
            "UPDATE books SET available_quantity = available_quantity - 1 WHERE id = $1 AND available_quantity > 0",
        )
        .bind(book_id)
        .execute(&mut *tx)
        .await?;
        if decremented.rows_affected() == 0 {
            return Err(AppError::Conflict(NOT_AVAILABLE.to_string()));
        }

        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records (user_id, book_id, borrowed_at, due_at, fine, billed_days)
            VALUES ($1, $2, $3, $4, 0, 0)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(borrowed_at)
        .bind(due_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_violation_as_conflict(e, ALREADY_BORROWED))?;

        tx.commit().await?;
        Ok(record)
    }

    async fn return_book(
        &self,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
        policy: FinePolicy,
    ) -> AppResult<ReturnOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            SELECT * FROM borrow_records
            WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_BORROWED.to_string()))?;

        let assessment = policy.assess(&record, now);
        policy.settle(&mut record, &assessment);
        record.returned_at = Some(now);

        sqlx::query("UPDATE borrow_records SET returned_at = $1, fine = $2, billed_days = $3 WHERE id = $4")
            .bind(record.returned_at)
            .bind(record.fine)
            .bind(record.billed_days)
            .bind(record.id)
            .execute(&mut *tx)
            .await?;

        let book_title: String = sqlx::query_scalar(
            "UPDATE books SET available_quantity = available_quantity + 1 WHERE id = $1 RETURNING title",
        )
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await?;

        let fee = if assessment.is_chargeable() {
            Some(
                sqlx::query_as::<_, Fee>(
                    r#"
                    INSERT INTO fees (user_id, borrow_record_id, created_at, amount, reason)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                    "#,
                )
                .bind(user_id)
                .bind(record.id)
                .bind(now)
                .bind(assessment.charge)
                .bind(late_return_reason(&book_title))
                .fetch_one(&mut *tx)
                .await?,
            )
        } else {
            None
        };

        tx.commit().await?;

        Ok(ReturnOutcome {
            record,
            book_title,
            assessment,
            fee,
        })
    }

    async fn bill_overdue(&self, now: DateTime<Utc>, policy: FinePolicy) -> AppResult<SweepReport> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "{} WHERE r.returned_at IS NULL AND r.due_at < $1 ORDER BY r.id FOR UPDATE OF r",
            LOAN_ROW_SELECT
        );
        let rows = sqlx::query_as::<_, LoanRow>(&query)
            .bind(now)
            .fetch_all(&mut *tx)
            .await?;

        let mut report = SweepReport {
            overdue_records: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let mut record = row.record;
            let assessment = policy.assess(&record, now);
            if !assessment.is_chargeable() {
                continue;
            }

            let first_day = i64::from(record.billed_days) + 1;
            sqlx::query(
                r#"
                INSERT INTO fees (user_id, borrow_record_id, created_at, amount, reason)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.user_id)
            .bind(record.id)
            .bind(now)
            .bind(assessment.charge)
            .bind(overdue_reason(&row.book_title, first_day, assessment.days_overdue))
            .execute(&mut *tx)
            .await?;

            policy.settle(&mut record, &assessment);
            sqlx::query("UPDATE borrow_records SET fine = $1, billed_days = $2 WHERE id = $3")
                .bind(record.fine)
                .bind(record.billed_days)
                .bind(record.id)
                .execute(&mut *tx)
                .await?;

            report.fees_created += 1;
            report.total_charged += assessment.charge;
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn list(&self, filter: LoanFilter) -> AppResult<Vec<LoanRow>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(LOAN_ROW_SELECT);
        builder.push(" WHERE TRUE");

        if let Some(user_id) = filter.user_id {
            builder.push(" AND r.user_id = ").push_bind(user_id);
        }
        if let Some(book_id) = filter.book_id {
            builder.push(" AND r.book_id = ").push_bind(book_id);
        }
        if filter.active_only || filter.overdue_at.is_some() {
            builder.push(" AND r.returned_at IS NULL");
        }
        if let Some(now) = filter.overdue_at {
            builder.push(" AND r.due_at < ").push_bind(now);
        }
        builder.push(" ORDER BY r.borrowed_at DESC, r.id DESC");

        let rows = builder
            .build_query_as::<LoanRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn counts(&self, user_id: Option<i32>, now: DateTime<Utc>) -> AppResult<LoanCounts> {
        let (total, active, overdue): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE returned_at IS NULL),
                   COUNT(*) FILTER (WHERE returned_at IS NULL AND due_at < $1)
            FROM borrow_records
            WHERE ($2::INTEGER IS NULL OR user_id = $2)
            "#,
        )
        .bind(now)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(LoanCounts {
            total,
            active,
            overdue,
        })
    }

    async fn popular_books(&self, limit: i64) -> AppResult<Vec<PopularBook>> {
        let books = sqlx::query_as::<_, PopularBook>(
            r#"
            SELECT b.id AS book_id, b.title, b.author, COUNT(r.id) AS borrow_count
            FROM books b
            JOIN borrow_records r ON r.book_id = b.id
            GROUP BY b.id
            ORDER BY borrow_count DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn active_users(&self, limit: i64) -> AppResult<Vec<ActiveUser>> {
        let users = sqlx::query_as::<_, ActiveUser>(
            r#"
            SELECT u.id AS user_id, u.fullname, u.username, COUNT(r.id) AS borrow_count
            FROM users u
            JOIN borrow_records r ON r.user_id = u.id
            GROUP BY u.id
            ORDER BY borrow_count DESC, u.fullname
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}
