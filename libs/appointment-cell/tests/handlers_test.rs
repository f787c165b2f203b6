use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::services::dispatcher::SideEffectDispatcher;
use appointment_cell::services::sinks::{InMemoryEvidenceSink, InMemoryNotificationSink};
use appointment_cell::store::MemoryBookingStore;
use appointment_cell::{appointment_routes, counselor_schedule_routes, AppointmentBookingService};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn create_test_app() -> Router {
    let config = TestConfig::default().to_arc();
    let dispatcher = SideEffectDispatcher::new(
        Arc::new(InMemoryNotificationSink::new()),
        Arc::new(InMemoryEvidenceSink::new()),
    );
    let service = Arc::new(AppointmentBookingService::new(
        Arc::new(MemoryBookingStore::new()),
        dispatcher,
    ));

    Router::new()
        .nest("/appointments", appointment_routes(config.clone(), service.clone()))
        .nest("/counselors", counselor_schedule_routes(config, service))
}

fn token_for(user: &TestUser) -> String {
    JwtTestUtils::create_test_token(user, &TestConfig::default().jwt_secret, Some(1))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

async fn publish_slot(app: &Router, counselor_token: &str) -> Value {
    let start = Utc::now() + Duration::days(1);
    let (status, body) = send(
        app,
        Method::POST,
        "/counselors/schedules",
        Some(counselor_token),
        Some(json!({
            "start_time": start,
            "end_time": start + Duration::minutes(50),
            "mode": "ONLINE"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    body["schedule"].clone()
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = create_test_app();

    let (status, body) = send(&app, Method::GET, "/appointments", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let client = TestUser::client("client@example.com");
    let forged = JwtTestUtils::create_invalid_signature_token(&client);
    let (status, _) = send(&app, Method::GET, "/appointments", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_book_then_conflict_over_http() {
    let app = create_test_app();
    let counselor = TestUser::counselor("counselor@example.com");
    let first = TestUser::client("first@example.com");
    let second = TestUser::client("second@example.com");

    let schedule = publish_slot(&app, &token_for(&counselor)).await;
    assert_eq!(schedule["status"], "AVAILABLE");
    assert_eq!(schedule["mode"], "ONLINE");

    let booking = json!({
        "counselor_id": counselor.id,
        "schedule_id": schedule["id"],
        "user_note": "Trouble sleeping"
    });

    let (status, body) = send(&app, Method::POST, "/appointments", Some(&token_for(&first)), Some(booking.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["status"], "BOOKED");
    assert_eq!(body["appointment"]["user_note"], "Trouble sleeping");
    assert_eq!(body["evidence"]["target_type"], "APPOINTMENT");
    assert_eq!(body["evidence"]["status"], "PENDING");

    let (status, body) = send(&app, Method::POST, "/appointments", Some(&token_for(&second)), Some(booking)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_wrong_role_is_forbidden() {
    let app = create_test_app();
    let client = TestUser::client("client@example.com");
    let start = Utc::now() + Duration::days(1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/counselors/schedules",
        Some(&token_for(&client)),
        Some(json!({
            "start_time": start,
            "end_time": start + Duration::hours(1),
            "mode": "OFFLINE",
            "location": "Room 3"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_inverted_range_is_bad_request() {
    let app = create_test_app();
    let counselor = TestUser::counselor("counselor@example.com");
    let start = Utc::now() + Duration::days(1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/counselors/schedules",
        Some(&token_for(&counselor)),
        Some(json!({
            "start_time": start,
            "end_time": start - Duration::hours(1),
            "mode": "ONLINE"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_RANGE");
}

#[tokio::test]
async fn test_unknown_schedule_and_mismatched_counselor() {
    let app = create_test_app();
    let counselor = TestUser::counselor("counselor@example.com");
    let client = TestUser::client("client@example.com");
    let schedule = publish_slot(&app, &token_for(&counselor)).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/appointments",
        Some(&token_for(&client)),
        Some(json!({ "counselor_id": counselor.id, "schedule_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(
        &app,
        Method::POST,
        "/appointments",
        Some(&token_for(&client)),
        Some(json!({ "counselor_id": Uuid::new_v4(), "schedule_id": schedule["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISMATCH");
}

#[tokio::test]
async fn test_full_session_lifecycle_over_http() {
    let app = create_test_app();
    let counselor = TestUser::counselor("counselor@example.com");
    let client = TestUser::client("client@example.com");
    let counselor_token = token_for(&counselor);
    let client_token = token_for(&client);

    let schedule = publish_slot(&app, &counselor_token).await;
    let (_, body) = send(
        &app,
        Method::POST,
        "/appointments",
        Some(&client_token),
        Some(json!({ "counselor_id": counselor.id, "schedule_id": schedule["id"] })),
    )
    .await;
    let appointment_id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, &format!("/appointments/{}", appointment_id), Some(&client_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["id"], appointment_id.as_str());

    // Clients cannot complete their own sessions
    let uri = format!("/appointments/{}/complete", appointment_id);
    let (status, _) = send(&app, Method::POST, &uri, Some(&client_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, &uri, Some(&counselor_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "COMPLETED");
    assert!(body["appointment"]["completed_at"].is_string());

    let (status, body) = send(&app, Method::POST, &uri, Some(&counselor_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/appointments/{}/note", appointment_id),
        Some(&counselor_token),
        Some(json!({ "note": "Discussed sleep hygiene" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["counselor_note"], "Discussed sleep hygiene");

    let (status, body) = send(&app, Method::GET, "/appointments", Some(&counselor_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_cancel_frees_slot_for_listing() {
    let app = create_test_app();
    let counselor = TestUser::counselor("counselor@example.com");
    let client = TestUser::client("client@example.com");
    let client_token = token_for(&client);
    let counselor_token = token_for(&counselor);

    let schedule = publish_slot(&app, &counselor_token).await;
    let available_uri = format!("/counselors/{}/schedules/available", counselor.id);

    let (_, body) = send(
        &app,
        Method::POST,
        "/appointments",
        Some(&client_token),
        Some(json!({ "counselor_id": counselor.id, "schedule_id": schedule["id"] })),
    )
    .await;
    let appointment_id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, Method::GET, &available_uri, Some(&client_token), None).await;
    assert_eq!(body["total"], 0);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/appointments/{}/cancel", appointment_id),
        Some(&client_token),
        Some(json!({ "reason": "Schedule clash" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "CANCELLED_BY_USER");

    let (_, body) = send(&app, Method::GET, &available_uri, Some(&client_token), None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["schedules"][0]["id"], schedule["id"]);
}

#[tokio::test]
async fn test_counselor_withdraws_schedule() {
    let app = create_test_app();
    let counselor = TestUser::counselor("counselor@example.com");
    let counselor_token = token_for(&counselor);
    let schedule = publish_slot(&app, &counselor_token).await;
    let schedule_id = schedule["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/counselors/schedules/{}/cancel", schedule_id),
        Some(&counselor_token),
        Some(json!({ "reason": "Annual leave" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["status"], "CANCELLED");
    assert_eq!(body["schedule"]["cancel_reason"], "Annual leave");

    let (status, body) = send(&app, Method::GET, "/counselors/schedules?status=CANCELLED", Some(&counselor_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (_, body) = send(&app, Method::GET, "/counselors/schedules?status=AVAILABLE", Some(&counselor_token), None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_cancel_without_body_means_no_reason() {
    let app = create_test_app();
    let counselor = TestUser::counselor("counselor@example.com");
    let client = TestUser::client("client@example.com");
    let client_token = token_for(&client);
    let counselor_token = token_for(&counselor);

    let schedule = publish_slot(&app, &counselor_token).await;
    let (_, body) = send(
        &app,
        Method::POST,
        "/appointments",
        Some(&client_token),
        Some(json!({ "counselor_id": counselor.id, "schedule_id": schedule["id"] })),
    )
    .await;
    let appointment_id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/appointments/{}/cancel", appointment_id),
        Some(&client_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "CANCELLED_BY_USER");
    assert!(body["appointment"]["cancel_reason"].is_null());

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/counselors/schedules/{}/cancel", schedule["id"].as_str().unwrap()),
        Some(&counselor_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["status"], "CANCELLED");
    assert!(body["schedule"]["cancel_reason"].is_null());
}
