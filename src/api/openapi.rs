//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, stats, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "1.0.0",
        description = "Library management REST API: catalogue, borrowing and fines",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::list_categories,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Loans and fees
        loans::borrow_book,
        loans::return_book,
        loans::list_loans,
        loans::list_overdue,
        loans::sweep_fines,
        loans::get_user_loans,
        loans::get_user_overdue,
        loans::get_user_history,
        loans::get_user_fees,
        loans::list_fees,
        // Users
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        // Stats
        stats::get_student_dashboard,
        stats::get_stats,
        stats::get_report,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::BookQuery,
            crate::models::book::BookDetails,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::UserQuery,
            crate::models::user::RegisterUser,
            crate::models::user::UpdateUser,
            // Loans
            loans::LoanRequest,
            loans::BorrowResponse,
            loans::ReturnResponse,
            crate::models::loan::BorrowRecord,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            // Fees
            crate::models::fee::Fee,
            crate::models::fee::FeeDetails,
            crate::models::fee::SweepReport,
            // Stats
            crate::models::stats::StudentDashboard,
            crate::models::stats::UserProfile,
            crate::models::stats::AdminDashboard,
            crate::models::stats::ReportKind,
            crate::models::stats::PopularBook,
            crate::models::stats::ActiveUser,
            crate::models::stats::SummaryReport,
            crate::models::stats::Report,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and authentication"),
        (name = "books", description = "Book catalogue"),
        (name = "loans", description = "Borrowing and returning"),
        (name = "fees", description = "Overdue fines"),
        (name = "users", description = "User management"),
        (name = "stats", description = "Dashboards and reports")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
