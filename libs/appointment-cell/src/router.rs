// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;

/// Mounted under `/appointments`.
pub fn appointment_routes(config: Arc<AppConfig>, service: Arc<AppointmentBookingService>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment).get(handlers::list_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/note", patch(handlers::update_counselor_note))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}

/// Mounted under `/counselors`.
pub fn counselor_schedule_routes(config: Arc<AppConfig>, service: Arc<AppointmentBookingService>) -> Router {
    Router::new()
        .route("/schedules", post(handlers::create_schedule).get(handlers::list_my_schedules))
        .route("/schedules/{schedule_id}/cancel", patch(handlers::cancel_schedule))
        .route("/{counselor_id}/schedules/available", get(handlers::list_available_schedules))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}
