//! Dashboard and report endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        stats::{AdminDashboard, Report, ReportQuery, StudentDashboard},
        user::Access,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Student dashboard
#[utoipa::path(
    get,
    path = "/users/{id}/dashboard",
    tag = "stats",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Dashboard counters", body = StudentDashboard),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_student_dashboard(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<StudentDashboard>> {
    claims.authorize(Access::Owner(user_id))?;

    let dashboard = state.services.stats.student_dashboard(user_id).await?;
    Ok(Json(dashboard))
}

/// Admin dashboard
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Library-wide counters", body = AdminDashboard),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<AdminDashboard>> {
    claims.require_admin()?;

    let dashboard = state.services.stats.admin_dashboard().await?;
    Ok(Json(dashboard))
}

/// Reports: summary, most borrowed books, most active users
#[utoipa::path(
    get,
    path = "/stats/reports",
    tag = "stats",
    security(("bearer_auth" = [])),
    params(ReportQuery),
    responses(
        (status = 200, description = "Report", body = Report),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn get_report(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Report>> {
    claims.require_admin()?;

    let report = state.services.stats.report(query.kind).await?;
    Ok(Json(report))
}
