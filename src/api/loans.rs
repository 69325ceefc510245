//! Loan, overdue and fee endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::{
        fee::{Fee, FeeDetails, SweepReport},
        loan::{BorrowRecord, LoanDetails},
    },
    AppState,
};

use super::{ApiJson, AuthenticatedUser};

/// Borrow or return request. `user_id` defaults to the caller; only admins may name someone else.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoanRequest {
    pub book_id: i32,
    pub user_id: Option<i32>,
}

/// Borrow response
#[derive(Serialize, ToSchema)]
pub struct BorrowResponse {
    /// Status message
    pub message: String,
    pub record: BorrowRecord,
}

/// Return response with the fine assessed for the loan
#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    /// Status message
    pub message: String,
    pub record: BorrowRecord,
    /// Whole days past due at return time
    pub days_overdue: i64,
    /// Fine for the whole overdue period
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub fine: Decimal,
    /// Part of the fine charged by this return; the rest was billed by earlier sweeps
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub charged: Decimal,
    pub fee: Option<Fee>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanListQuery {
    /// Only loans not yet returned
    #[serde(default)]
    pub active_only: bool,
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/loans/borrow",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanRequest,
    responses(
        (status = 201, description = "Book borrowed", body = BorrowResponse),
        (status = 400, description = "No copies available or already borrowed", body = crate::error::ErrorResponse),
        (status = 403, description = "Borrowing for another user", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<LoanRequest>,
) -> AppResult<(StatusCode, Json<BorrowResponse>)> {
    let record = state
        .services
        .loans
        .borrow(&claims, request.user_id, request.book_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BorrowResponse {
            message: "Book borrowed successfully".to_string(),
            record,
        }),
    ))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanRequest,
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 403, description = "Returning for another user", body = crate::error::ErrorResponse),
        (status = 404, description = "No active loan for this book", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiJson(request): ApiJson<LoanRequest>,
) -> AppResult<Json<ReturnResponse>> {
    let outcome = state
        .services
        .loans
        .return_book(&claims, request.user_id, request.book_id)
        .await?;

    let message = if outcome.assessment.total > Decimal::ZERO {
        format!(
            "Book returned {} day(s) late, fine {}",
            outcome.assessment.days_overdue, outcome.assessment.total
        )
    } else {
        "Book returned successfully".to_string()
    };

    Ok(Json(ReturnResponse {
        message,
        record: outcome.record,
        days_overdue: outcome.assessment.days_overdue,
        fine: outcome.assessment.total,
        charged: outcome.assessment.charge,
        fee: outcome.fee,
    }))
}

/// All loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanListQuery),
    responses(
        (status = 200, description = "Loans, newest first", body = Vec<LoanDetails>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanListQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.all_loans(&claims, query.active_only).await?;
    Ok(Json(loans))
}

/// All overdue loans
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<LoanDetails>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.all_overdue(&claims).await?;
    Ok(Json(loans))
}

/// Bill overdue loans now
#[utoipa::path(
    post,
    path = "/loans/fines/sweep",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn sweep_fines(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<SweepReport>> {
    let report = state.services.loans.sweep_fines(&claims).await?;
    Ok(Json(report))
}

/// Get active loans for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's active loans", body = Vec<LoanDetails>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.user_loans(&claims, user_id).await?;
    Ok(Json(loans))
}

/// Get overdue loans for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's overdue loans", body = Vec<LoanDetails>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.user_overdue(&claims, user_id).await?;
    Ok(Json(loans))
}

/// Get the full borrow history of a user
#[utoipa::path(
    get,
    path = "/users/{id}/history",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "All loans of the user", body = Vec<LoanDetails>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.user_history(&claims, user_id).await?;
    Ok(Json(loans))
}

/// Get the fees charged to a user
#[utoipa::path(
    get,
    path = "/users/{id}/fees",
    tag = "fees",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's fees, newest first", body = Vec<FeeDetails>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_fees(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<FeeDetails>>> {
    let fees = state.services.loans.user_fees(&claims, user_id).await?;
    Ok(Json(fees))
}

/// All fees
#[utoipa::path(
    get,
    path = "/fees",
    tag = "fees",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fees, newest first", body = Vec<FeeDetails>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_fees(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<FeeDetails>>> {
    let fees = state.services.loans.all_fees(&claims).await?;
    Ok(Json(fees))
}
