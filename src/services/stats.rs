//! Dashboards and reports

use chrono::Utc;

use crate::{
    error::AppResult,
    models::stats::{AdminDashboard, Report, ReportKind, StudentDashboard, SummaryReport},
    repository::Repository,
};

/// Entries in the ranked reports
pub const REPORT_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn student_dashboard(&self, user_id: i32) -> AppResult<StudentDashboard> {
        let user = self.repository.users.get_by_id(user_id).await?;
        let loans = self.repository.loans.counts(Some(user_id), Utc::now()).await?;
        let books = self.repository.books.counts().await?;
        let total_fines = self.repository.fees.total(Some(user_id)).await?;

        Ok(StudentDashboard {
            user,
            borrowed_count: loans.active,
            overdue_count: loans.overdue,
            available_count: books.available,
            total_fines,
        })
    }

    pub async fn admin_dashboard(&self) -> AppResult<AdminDashboard> {
        let books = self.repository.books.counts().await?;
        let users = self.repository.users.counts().await?;
        let loans = self.repository.loans.counts(None, Utc::now()).await?;
        let total_fines = self.repository.fees.total(None).await?;

        Ok(AdminDashboard {
            total_books: books.total,
            total_users: users.total,
            active_students: users.students,
            borrowed_books: loans.active,
            overdue_books: loans.overdue,
            total_fines,
        })
    }

    pub async fn report(&self, kind: ReportKind) -> AppResult<Report> {
        let report = match kind {
            ReportKind::Summary => {
                let books = self.repository.books.counts().await?;
                let users = self.repository.users.counts().await?;
                let loans = self.repository.loans.counts(None, Utc::now()).await?;
                Report::Summary(SummaryReport {
                    total_books: books.total,
                    total_users: users.total,
                    borrowed_books: loans.active,
                    total_fines: self.repository.fees.total(None).await?,
                    generated_at: Utc::now(),
                })
            }
            ReportKind::PopularBooks => {
                Report::PopularBooks(self.repository.loans.popular_books(REPORT_LIMIT).await?)
            }
            ReportKind::ActiveUsers => {
                Report::ActiveUsers(self.repository.loans.active_users(REPORT_LIMIT).await?)
            }
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::*;
    use crate::{
        models::loan::LoanCounts,
        repository::{
            books::{BookCounts, MockBooksRepository},
            fees::MockFeesRepository,
            loans::MockLoansRepository,
            users::{MockUsersRepository, UserCounts},
        },
    };

    #[tokio::test]
    async fn test_admin_dashboard_combines_counters() {
        let mut books = MockBooksRepository::new();
        books
            .expect_counts()
            .returning(|| Ok(BookCounts { total: 12, available: 9 }));
        let mut users = MockUsersRepository::new();
        users
            .expect_counts()
            .returning(|| Ok(UserCounts { total: 5, students: 4 }));
        let mut loans = MockLoansRepository::new();
        loans
            .expect_counts()
            .withf(|user_id, _| user_id.is_none())
            .returning(|_, _| {
                Ok(LoanCounts {
                    total: 30,
                    active: 7,
                    overdue: 2,
                })
            });
        let mut fees = MockFeesRepository::new();
        fees.expect_total()
            .returning(|_| Ok(Decimal::new(1250, 2)));

        let stats = StatsService::new(Repository {
            pool: None,
            books: Arc::new(books),
            users: Arc::new(users),
            loans: Arc::new(loans),
            fees: Arc::new(fees),
        });

        let dashboard = stats.admin_dashboard().await.unwrap();
        assert_eq!(dashboard.total_books, 12);
        assert_eq!(dashboard.active_students, 4);
        assert_eq!(dashboard.borrowed_books, 7);
        assert_eq!(dashboard.overdue_books, 2);
        assert_eq!(dashboard.total_fines, Decimal::new(1250, 2));
    }

    #[tokio::test]
    async fn test_ranked_reports_are_limited() {
        let mut loans = MockLoansRepository::new();
        loans
            .expect_popular_books()
            .withf(|limit| *limit == REPORT_LIMIT)
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let stats = StatsService::new(Repository {
            pool: None,
            books: Arc::new(MockBooksRepository::new()),
            users: Arc::new(MockUsersRepository::new()),
            loans: Arc::new(loans),
            fees: Arc::new(MockFeesRepository::new()),
        });

        assert!(matches!(
            stats.report(ReportKind::PopularBooks).await.unwrap(),
            Report::PopularBooks(books) if books.is_empty()
        ));
    }
}
