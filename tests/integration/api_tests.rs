//! API integration tests, driving the router over the in-memory store

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_server::{api, repository::Repository, AppConfig, AppState};

const ADMIN_PASSWORD: &str = "admin-password";

async fn test_app() -> (Router, AppState) {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-secret".to_string();
    config.auth.bootstrap_admin_login = Some("admin".to_string());
    config.auth.bootstrap_admin_password = Some(ADMIN_PASSWORD.to_string());

    let state = AppState::new(config, Repository::in_memory());
    state
        .services
        .users
        .ensure_admin()
        .await
        .expect("Failed to create admin");

    (api::router(state.clone()), state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("Failed to build request");

    let response = app.clone().oneshot(request).await.expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Body is not JSON")
    };
    (status, value)
}

/// Helper to get a token for the given credentials
async fn get_auth_token(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().expect("No token in response").to_string()
}

/// Register a student and return (id, token)
async fn register_student(app: &Router, username: &str) -> (i64, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "fullname": format!("Student {}", username),
            "username": username,
            "email": format!("{}@example.org", username),
            "password": "secret-password"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    assert_eq!(body["role"], "student");
    assert!(body.get("password").is_none());

    let id = body["id"].as_i64().expect("No id");
    (id, get_auth_token(app, username, "secret-password").await)
}

async fn create_book(app: &Router, admin: &str, title: &str, total: i32) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/books",
        Some(admin),
        Some(json!({
            "title": title,
            "author": "Mary Shelley",
            "isbn": "9780486282114",
            "category": "Gothic",
            "total_quantity": total
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create book failed: {}", body);
    assert_eq!(body["available_quantity"], total);
    body["id"].as_i64().expect("No id")
}

async fn available(app: &Router, token: &str, book_id: i64) -> i64 {
    let (_, body) = send(
        app,
        Method::GET,
        &format!("/api/v1/books/{}", book_id),
        Some(token),
        None,
    )
    .await;
    body["available_quantity"].as_i64().expect("No availability")
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/books", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let (status, _) = send(&app, Method::GET, "/api/v1/auth/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let (app, _) = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_student_cannot_act_for_others_or_as_admin() {
    let (app, _) = test_app().await;
    let admin = get_auth_token(&app, "admin", ADMIN_PASSWORD).await;
    let book_id = create_book(&app, &admin, "Frankenstein", 2).await;
    let (_, alice) = register_student(&app, "alice").await;
    let (bob_id, _) = register_student(&app, "bob").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/borrow",
        Some(&alice),
        Some(json!({ "book_id": book_id, "user_id": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");
    assert_eq!(available(&app, &alice, book_id).await, 2);

    for uri in [
        format!("/api/v1/users/{}/loans", bob_id),
        format!("/api/v1/users/{}/fees", bob_id),
        format!("/api/v1/users/{}", bob_id),
        "/api/v1/loans/overdue".to_string(),
        "/api/v1/stats".to_string(),
        "/api/v1/users".to_string(),
    ] {
        let (status, _) = send(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
    }

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/books",
        Some(&alice),
        Some(json!({ "title": "x", "author": "y", "isbn": "z", "total_quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_borrow_return_scenario() {
    let (app, state) = test_app().await;
    let admin = get_auth_token(&app, "admin", ADMIN_PASSWORD).await;
    let book_id = create_book(&app, &admin, "The Last Man", 2).await;
    let (u1, t1) = register_student(&app, "u1").await;
    let (_, t2) = register_student(&app, "u2").await;
    let (_, t3) = register_student(&app, "u3").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/borrow",
        Some(&t1),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert!(body["record"]["due_at"].is_string());
    assert_eq!(available(&app, &t1, book_id).await, 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/borrow",
        Some(&t1),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You already have this book");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/loans/borrow",
        Some(&t2),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(available(&app, &t1, book_id).await, 0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/borrow",
        Some(&t3),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Conflict");
    assert_eq!(body["message"], "Book not available");
    assert_eq!(available(&app, &t1, book_id).await, 0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/return",
        Some(&t1),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["fine"], 0.0);
    assert!(body["fee"].is_null());
    assert_eq!(available(&app, &t1, book_id).await, 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/return",
        Some(&t1),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Book not found in your borrowed list");

    let (status, history) = send(
        &app,
        Method::GET,
        &format!("/api/v1/users/{}/history", u1),
        Some(&t1),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(history[0]["status"], "returned");

    // The in-memory store keeps availability consistent with the records
    let counts = state.repository.loans.counts(None, Utc::now()).await.unwrap();
    assert_eq!(counts.active, 1);
}

#[tokio::test]
async fn test_late_return_creates_one_fee() {
    let (app, state) = test_app().await;
    let admin = get_auth_token(&app, "admin", ADMIN_PASSWORD).await;
    let book_id = create_book(&app, &admin, "Mathilda", 1).await;
    let (user_id, token) = register_student(&app, "late").await;

    // Loan taken 20 days ago, due 6 days ago
    let borrowed_at = Utc::now() - Duration::days(20);
    state
        .repository
        .loans
        .borrow(
            user_id as i32,
            book_id as i32,
            borrowed_at,
            borrowed_at + Duration::days(14),
        )
        .await
        .unwrap();

    let (status, overdue) = send(
        &app,
        Method::GET,
        &format!("/api/v1/users/{}/loans/overdue", user_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overdue[0]["is_overdue"], true);
    assert_eq!(overdue[0]["days_overdue"], 6);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/return",
        Some(&token),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["days_overdue"], 6);
    assert_eq!(body["fine"], 6.0);
    assert_eq!(body["charged"], 6.0);
    assert_eq!(body["fee"]["reason"], "Late return for book: Mathilda");

    let (status, fees) = send(
        &app,
        Method::GET,
        &format!("/api/v1/users/{}/fees", user_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fees.as_array().map(Vec::len), Some(1));
    assert_eq!(fees[0]["amount"], 6.0);

    let (_, dashboard) = send(
        &app,
        Method::GET,
        &format!("/api/v1/users/{}/dashboard", user_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(dashboard["borrowed_count"], 0);
    assert_eq!(dashboard["total_fines"], 6.0);
}

#[tokio::test]
async fn test_sweep_then_return_bills_once() {
    let (app, state) = test_app().await;
    let admin = get_auth_token(&app, "admin", ADMIN_PASSWORD).await;
    let book_id = create_book(&app, &admin, "Valperga", 1).await;
    let (user_id, token) = register_student(&app, "swept").await;

    let borrowed_at = Utc::now() - Duration::days(18);
    state
        .repository
        .loans
        .borrow(
            user_id as i32,
            book_id as i32,
            borrowed_at,
            borrowed_at + Duration::days(14),
        )
        .await
        .unwrap();

    let (status, report) = send(&app, Method::POST, "/api/v1/loans/fines/sweep", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["fees_created"], 1);
    assert_eq!(report["total_charged"], 4.0);

    let (_, report) = send(&app, Method::POST, "/api/v1/loans/fines/sweep", Some(&admin), None).await;
    assert_eq!(report["fees_created"], 0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/return",
        Some(&token),
        Some(json!({ "book_id": book_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fine"], 4.0);
    assert_eq!(body["charged"], 0.0);
    assert!(body["fee"].is_null());

    let (_, fees) = send(&app, Method::GET, "/api/v1/fees", Some(&admin), None).await;
    assert_eq!(fees.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_admin_catalogue_and_user_management() {
    let (app, _) = test_app().await;
    let admin = get_auth_token(&app, "admin", ADMIN_PASSWORD).await;
    let book_id = create_book(&app, &admin, "Lodore", 3).await;
    let (student_id, student) = register_student(&app, "carol").await;

    send(
        &app,
        Method::POST,
        "/api/v1/loans/borrow",
        Some(&admin),
        Some(json!({ "book_id": book_id, "user_id": student_id })),
    )
    .await;

    // Total cannot drop below the copies on loan
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/books/{}", book_id),
        Some(&admin),
        Some(json!({ "total_quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/books/{}", book_id),
        Some(&admin),
        Some(json!({ "total_quantity": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_quantity"], 4);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/books/{}", book_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/users/{}", student_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Students edit their own name but not their role
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/users/{}", student_id),
        Some(&student),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/users/{}", student_id),
        Some(&student),
        Some(json!({ "fullname": "Carol Danvers" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fullname"], "Carol Danvers");

    let (status, profile) = send(&app, Method::GET, &format!("/api/v1/users/{}", student_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["currently_borrowed"], 1);
    assert_eq!(profile["username"], "carol");

    let (status, page) = send(&app, Method::GET, "/api/v1/users?role=student", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (status, report) = send(
        &app,
        Method::GET,
        "/api/v1/stats/reports?type=popular_books",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["type"], "popular_books");
    assert_eq!(report["report"][0]["title"], "Lodore");

    let (status, stats) = send(&app, Method::GET, "/api/v1/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["borrowed_books"], 1);
    assert_eq!(stats["active_students"], 1);
}

#[tokio::test]
async fn test_huge_page_returns_empty_list() {
    let (app, _) = test_app().await;
    let admin = get_auth_token(&app, "admin", ADMIN_PASSWORD).await;
    create_book(&app, &admin, "Frankenstein", 1).await;

    for path in ["/api/v1/books", "/api/v1/users"] {
        let (status, body) = send(
            &app,
            Method::GET,
            &format!("{}?page={}&per_page=100", path, i64::MAX),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}: {}", path, body);
        assert_eq!(body["items"], json!([]));
        assert_eq!(body["page"], i64::MAX);
    }
}

#[tokio::test]
async fn test_malformed_body_uses_error_format() {
    let (app, _) = test_app().await;
    let (student_id, student) = register_student(&app, "mary").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/loans/borrow",
        Some(&student),
        Some(json!({ "user_id": student_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 7);
    assert!(body["message"].as_str().is_some_and(|m| m.contains("book_id")));

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/users/{}", student_id),
        Some(&student),
        Some(json!({ "email": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
