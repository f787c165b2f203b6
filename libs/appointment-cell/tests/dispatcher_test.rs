use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::*;
use appointment_cell::services::dispatcher::{EvidenceSink, NotificationSink, SideEffectDispatcher};
use appointment_cell::services::sinks::{SupabaseEvidenceSink, SupabaseNotificationSink};
use appointment_cell::store::MemoryBookingStore;
use appointment_cell::AppointmentBookingService;
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn supabase_for(mock_server: &MockServer) -> Arc<SupabaseClient> {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    Arc::new(SupabaseClient::new(&config))
}

fn supabase_dispatcher(mock_server: &MockServer) -> SideEffectDispatcher {
    let supabase = supabase_for(mock_server);
    SideEffectDispatcher::new(
        Arc::new(SupabaseNotificationSink::new(supabase.clone())),
        Arc::new(SupabaseEvidenceSink::new(supabase)),
    )
}

#[tokio::test]
async fn test_evidence_sink_posts_pending_record() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/evidence_records"))
        .and(header("apikey", "test-anon-key"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "target_type": "APPOINTMENT",
            "target_id": appointment_id,
            "status": "PENDING"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::evidence_record_response("APPOINTMENT", appointment_id, "Appointment booked")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = SupabaseEvidenceSink::new(supabase_for(&mock_server));
    let record = sink
        .record(EvidenceTarget::Appointment, appointment_id, "Appointment booked".to_string())
        .await
        .unwrap();

    assert_eq!(record.target_type, EvidenceTarget::Appointment);
    assert_eq!(record.target_id, appointment_id);
    assert_eq!(record.status, "PENDING");
}

#[tokio::test]
async fn test_notification_sink_posts_unread_row() {
    let mock_server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .and(body_partial_json(json!({
            "user_id": user_id,
            "title": "Session completed",
            "is_read": false
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = SupabaseNotificationSink::new(supabase_for(&mock_server));
    sink.notify_in_app(Notification {
        user_id,
        title: "Session completed".to_string(),
        message: "Please share your feedback.".to_string(),
        link: "/appointments/x/feedback".to_string(),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_collaborator_outage_does_not_fail_booking() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/evidence_records"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("database unavailable", "XX000"),
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBookingStore::new());
    let service = AppointmentBookingService::new(store, supabase_dispatcher(&mock_server));

    let counselor = TestUser::counselor("counselor@example.com").context();
    let client = TestUser::client("client@example.com").context();
    let start = Utc::now() + Duration::days(3);
    let schedule = service
        .create_schedule(&counselor, CreateScheduleRequest {
            start_time: start,
            end_time: start + Duration::hours(1),
            mode: ScheduleMode::Offline,
            location: Some("Counseling center, room 2".to_string()),
        })
        .await
        .unwrap();

    let outcome = service
        .book_appointment(&client, BookAppointmentRequest {
            counselor_id: counselor.user_id,
            schedule_id: schedule.id,
            user_note: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.appointment.status, AppointmentStatus::Booked);
    assert!(outcome.evidence.is_none());
}

#[tokio::test]
async fn test_schedule_withdrawal_notifies_affected_client() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/evidence_records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::evidence_record_response("SCHEDULE", Uuid::new_v4(), "withdrawn")
        ])))
        .mount(&mock_server)
        .await;

    let client = TestUser::client("client@example.com").context();

    // One notification for the booking, one for the withdrawal
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryBookingStore::new());
    let service = AppointmentBookingService::new(store, supabase_dispatcher(&mock_server));
    let counselor = TestUser::counselor("counselor@example.com").context();
    let start = Utc::now() + Duration::days(5);

    let schedule = service
        .create_schedule(&counselor, CreateScheduleRequest {
            start_time: start,
            end_time: start + Duration::minutes(45),
            mode: ScheduleMode::Online,
            location: None,
        })
        .await
        .unwrap();
    service
        .book_appointment(&client, BookAppointmentRequest {
            counselor_id: counselor.user_id,
            schedule_id: schedule.id,
            user_note: None,
        })
        .await
        .unwrap();

    let cancelled = service
        .cancel_schedule(schedule.id, &counselor, Some("Illness".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ScheduleStatus::Cancelled);

    let requests = mock_server.received_requests().await.unwrap();
    let withdrawal = requests
        .iter()
        .filter(|r| r.url.path() == "/rest/v1/notifications")
        .last()
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&withdrawal.body).unwrap();
    assert_eq!(body["user_id"], json!(client.user_id));
    assert!(body["message"].as_str().unwrap().contains("Illness"));
}
