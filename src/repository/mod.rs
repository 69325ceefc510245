//! Repository layer for database operations
//!
//! Each table gets a trait with a PostgreSQL implementation. `in_memory`
//! implements every trait over one mutex-guarded state, for tests and demo mode.

pub mod books;
pub mod fees;
pub mod in_memory;
pub mod loans;
pub mod users;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::error::{AppError, AppResult};

pub use books::BooksRepository;
pub use fees::FeesRepository;
pub use loans::LoansRepository;
pub use users::UsersRepository;

/// Default page size for listings
pub const DEFAULT_PER_PAGE: i64 = 20;
/// Largest page size a caller may ask for
pub const MAX_PER_PAGE: i64 = 100;

/// Main repository struct holding the stores used by the services
#[derive(Clone)]
pub struct Repository {
    pub pool: Option<Pool<Postgres>>,
    pub books: Arc<dyn BooksRepository>,
    pub users: Arc<dyn UsersRepository>,
    pub loans: Arc<dyn LoansRepository>,
    pub fees: Arc<dyn FeesRepository>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::PgBooksRepository::new(pool.clone())),
            users: Arc::new(users::PgUsersRepository::new(pool.clone())),
            loans: Arc::new(loans::PgLoansRepository::new(pool.clone())),
            fees: Arc::new(fees::PgFeesRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a repository backed by process memory
    pub fn in_memory() -> Self {
        let store = Arc::new(in_memory::InMemoryStore::default());
        Self {
            pool: None,
            books: store.clone(),
            users: store.clone(),
            loans: store.clone(),
            fees: store,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(ref pool) = self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Normalize paging parameters into (page, per_page, offset)
pub fn page_bounds(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1).saturating_mul(per_page))
}

/// Turn a unique-constraint violation into a conflict, pass anything else through
pub(crate) fn unique_violation_as_conflict(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(None, None), (1, 20, 0));
        assert_eq!(page_bounds(Some(3), Some(10)), (3, 10, 20));
        assert_eq!(page_bounds(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(page_bounds(Some(-2), Some(0)), (1, 1, 0));
        assert_eq!(
            page_bounds(Some(i64::MAX), Some(100)),
            (i64::MAX, 100, i64::MAX)
        );
    }

    #[test]
    fn test_non_unique_errors_pass_through() {
        let err = unique_violation_as_conflict(sqlx::Error::RowNotFound, "dup");
        assert!(matches!(err, AppError::Database(sqlx::Error::RowNotFound)));
    }
}
