use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::dispatcher::{EvidenceSink, NotificationSink, SideEffectDispatcher};
use appointment_cell::services::sinks::{
    InMemoryEvidenceSink, InMemoryNotificationSink, SupabaseEvidenceSink, SupabaseNotificationSink,
};
use appointment_cell::store::{BookingStore, MemoryBookingStore, PostgresBookingStore};
use appointment_cell::AppointmentBookingService;
use shared_config::AppConfig;
use shared_database::{postgres::connect_pool, supabase::SupabaseClient};

async fn build_store(config: &AppConfig) -> Result<Arc<dyn BookingStore>> {
    if !config.is_database_configured() {
        warn!("No database configured, bookings will not survive a restart");
        return Ok(Arc::new(MemoryBookingStore::new()));
    }

    let store = PostgresBookingStore::new(connect_pool(config).await?);
    store.migrate().await?;
    info!("Booking tables migrated");
    Ok(Arc::new(store))
}

fn build_dispatcher(config: &AppConfig) -> SideEffectDispatcher {
    if !config.is_notifications_configured() {
        warn!("Supabase not configured, notifications and evidence are only logged");
        return SideEffectDispatcher::new(
            Arc::new(InMemoryNotificationSink::new()),
            Arc::new(InMemoryEvidenceSink::new()),
        );
    }

    let supabase = Arc::new(SupabaseClient::new(config));
    let notifications: Arc<dyn NotificationSink> = Arc::new(SupabaseNotificationSink::new(supabase.clone()));
    let evidence: Arc<dyn EvidenceSink> = Arc::new(SupabaseEvidenceSink::new(supabase));
    SideEffectDispatcher::new(notifications, evidence)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loading Env Vars
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting counseling booking API server");

    let config = Arc::new(AppConfig::from_env());

    let store = build_store(&config).await?;
    let dispatcher = build_dispatcher(&config);
    let booking_service = Arc::new(AppointmentBookingService::new(store, dispatcher));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), booking_service)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
