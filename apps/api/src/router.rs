use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, counselor_schedule_routes};
use appointment_cell::AppointmentBookingService;
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, booking_service: Arc<AppointmentBookingService>) -> Router {
    Router::new()
        .route("/", get(|| async { "Counseling booking API is running!" }))
        .nest("/appointments", appointment_routes(config.clone(), booking_service.clone()))
        .nest("/counselors", counselor_schedule_routes(config, booking_service))
}
