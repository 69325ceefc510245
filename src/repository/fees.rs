//! Fees repository

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{error::AppResult, models::fee::FeeDetails};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeesRepository: Send + Sync {
    /// Fees, newest first; all users when `user_id` is None
    async fn list(&self, user_id: Option<i32>) -> AppResult<Vec<FeeDetails>>;

    async fn total(&self, user_id: Option<i32>) -> AppResult<Decimal>;
}

#[derive(Clone)]
pub struct PgFeesRepository {
    pool: Pool<Postgres>,
}

impl PgFeesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeesRepository for PgFeesRepository {
    async fn list(&self, user_id: Option<i32>) -> AppResult<Vec<FeeDetails>> {
        let fees = sqlx::query_as::<_, FeeDetails>(
            r#"
            SELECT f.*, u.fullname AS user_fullname
            FROM fees f
            JOIN users u ON u.id = f.user_id
            WHERE ($1::INTEGER IS NULL OR f.user_id = $1)
            ORDER BY f.created_at DESC, f.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(fees)
    }

    async fn total(&self, user_id: Option<i32>) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM fees WHERE ($1::INTEGER IS NULL OR user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}
