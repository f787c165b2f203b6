// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::AuthContext;

use crate::models::{
    AppointmentError, BookAppointmentRequest, CancelAppointmentRequest, CancelScheduleRequest,
    CreateScheduleRequest, ScheduleQuery, UpdateCounselorNoteRequest,
};
use crate::services::booking::AppointmentBookingService;

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(actor): Extension<AuthContext>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppointmentError> {
    let outcome = service.book_appointment(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "evidence": outcome.evidence,
        "message": "Appointment booked successfully"
    }))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(actor): Extension<AuthContext>,
) -> Result<Json<Value>, AppointmentError> {
    let appointments = service.list_appointments(&actor).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<AuthContext>,
) -> Result<Json<Value>, AppointmentError> {
    let appointment = service.get_appointment(appointment_id, &actor).await?;

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<AuthContext>,
    request: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppointmentError> {
    // The body is optional; no body means no reason.
    let Json(request) = request.unwrap_or_default();
    let appointment = service
        .cancel_appointment(appointment_id, &actor, request.reason)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn update_counselor_note(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<AuthContext>,
    Json(request): Json<UpdateCounselorNoteRequest>,
) -> Result<Json<Value>, AppointmentError> {
    let appointment = service
        .update_counselor_note(appointment_id, &actor, request.note)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<AuthContext>,
) -> Result<Json<Value>, AppointmentError> {
    let appointment = service.complete_appointment(appointment_id, &actor).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment completed"
    })))
}

// ==============================================================================
// COUNSELOR SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_schedule(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(actor): Extension<AuthContext>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppointmentError> {
    let schedule = service.create_schedule(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "schedule": schedule
    }))))
}

#[axum::debug_handler]
pub async fn list_my_schedules(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(actor): Extension<AuthContext>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppointmentError> {
    let schedules = service.list_schedules(&actor, query.status).await?;

    Ok(Json(json!({
        "schedules": schedules,
        "total": schedules.len()
    })))
}

#[axum::debug_handler]
pub async fn list_available_schedules(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(counselor_id): Path<Uuid>,
) -> Result<Json<Value>, AppointmentError> {
    let schedules = service.list_available_schedules(counselor_id).await?;

    Ok(Json(json!({
        "schedules": schedules,
        "total": schedules.len()
    })))
}

#[axum::debug_handler]
pub async fn cancel_schedule(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(schedule_id): Path<Uuid>,
    Extension(actor): Extension<AuthContext>,
    request: Option<Json<CancelScheduleRequest>>,
) -> Result<Json<Value>, AppointmentError> {
    let Json(request) = request.unwrap_or_default();
    let schedule = service
        .cancel_schedule(schedule_id, &actor, request.reason)
        .await?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule,
        "message": "Schedule cancelled"
    })))
}
