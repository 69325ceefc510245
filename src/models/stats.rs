//! Dashboard, profile and report payloads

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::user::User;

/// Student dashboard
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentDashboard {
    pub user: User,
    pub borrowed_count: i64,
    pub overdue_count: i64,
    /// Titles with at least one copy on the shelf
    pub available_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_fines: Decimal,
}

/// User profile with borrowing totals
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub total_borrowed: i64,
    pub currently_borrowed: i64,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_fines: Decimal,
}

/// Admin dashboard
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub total_books: i64,
    pub total_users: i64,
    pub active_students: i64,
    pub borrowed_books: i64,
    pub overdue_books: i64,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_fines: Decimal,
}

/// Report type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    #[default]
    Summary,
    PopularBooks,
    ActiveUsers,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    #[serde(rename = "type", default)]
    pub kind: ReportKind,
}

/// Book ranked by number of borrows
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct PopularBook {
    pub book_id: i32,
    pub title: String,
    pub author: String,
    pub borrow_count: i64,
}

/// User ranked by number of borrows
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct ActiveUser {
    pub user_id: i32,
    pub fullname: String,
    pub username: String,
    pub borrow_count: i64,
}

/// Library-wide summary
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SummaryReport {
    pub total_books: i64,
    pub total_users: i64,
    pub borrowed_books: i64,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_fines: Decimal,
    pub generated_at: DateTime<Utc>,
}

/// Report payload, tagged with its type
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", content = "report", rename_all = "snake_case")]
pub enum Report {
    Summary(SummaryReport),
    PopularBooks(Vec<PopularBook>),
    ActiveUsers(Vec<ActiveUser>),
}
