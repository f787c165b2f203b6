// libs/appointment-cell/src/services/dispatcher.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_models::auth::Role;

use crate::models::{Appointment, EvidenceRecord, EvidenceTarget, Notification, Schedule};

/// In-app notification collaborator.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_in_app(&self, notification: Notification) -> Result<()>;
}

/// Append-only evidence placeholder collaborator.
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn record(&self, target_type: EvidenceTarget, target_id: Uuid, summary: String) -> Result<EvidenceRecord>;
}

/// A committed transition whose side effects still have to run.
#[derive(Debug, Clone)]
pub enum BookingEvent {
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentCancelled {
        appointment: Appointment,
        cancelled_by: Role,
    },
    AppointmentCompleted {
        appointment: Appointment,
    },
    ScheduleCancelled {
        schedule: Schedule,
        affected_appointment: Option<Appointment>,
    },
}

impl BookingEvent {
    fn evidence(&self) -> (EvidenceTarget, Uuid, String) {
        match self {
            BookingEvent::AppointmentBooked { appointment } => (
                EvidenceTarget::Appointment,
                appointment.id,
                format!("Appointment booked on schedule {}", appointment.schedule_id),
            ),
            BookingEvent::AppointmentCancelled { appointment, cancelled_by } => (
                EvidenceTarget::Appointment,
                appointment.id,
                format!("Appointment cancelled by {}", cancelled_by),
            ),
            BookingEvent::AppointmentCompleted { appointment } => (
                EvidenceTarget::Appointment,
                appointment.id,
                "Counseling session completed".to_string(),
            ),
            BookingEvent::ScheduleCancelled { schedule, .. } => (
                EvidenceTarget::Schedule,
                schedule.id,
                format!(
                    "Schedule withdrawn by counselor: {}",
                    schedule.cancel_reason.as_deref().unwrap_or("no reason given")
                ),
            ),
        }
    }

    fn notifications(&self) -> Vec<Notification> {
        match self {
            BookingEvent::AppointmentBooked { appointment } => vec![Notification {
                user_id: appointment.counselor_id,
                title: "New appointment".to_string(),
                message: "A client booked one of your time slots.".to_string(),
                link: appointment_link(appointment.id),
            }],
            BookingEvent::AppointmentCancelled { appointment, cancelled_by } => {
                let to_counselor = Notification {
                    user_id: appointment.counselor_id,
                    title: "Appointment cancelled".to_string(),
                    message: "The client cancelled the appointment. The time slot is open again.".to_string(),
                    link: appointment_link(appointment.id),
                };
                let to_user = Notification {
                    user_id: appointment.user_id,
                    title: "Appointment cancelled".to_string(),
                    message: cancellation_message(appointment),
                    link: appointment_link(appointment.id),
                };

                match cancelled_by {
                    Role::User => vec![to_counselor],
                    Role::Counselor => vec![to_user],
                    Role::Admin => vec![to_counselor, to_user],
                }
            }
            BookingEvent::AppointmentCompleted { appointment } => vec![Notification {
                user_id: appointment.user_id,
                title: "Session completed".to_string(),
                message: "Your session is complete. Please share your feedback.".to_string(),
                link: format!("{}/feedback", appointment_link(appointment.id)),
            }],
            BookingEvent::ScheduleCancelled { affected_appointment, .. } => affected_appointment
                .iter()
                .map(|appointment| Notification {
                    user_id: appointment.user_id,
                    title: "Appointment cancelled".to_string(),
                    message: cancellation_message(appointment),
                    link: appointment_link(appointment.id),
                })
                .collect(),
        }
    }
}

fn appointment_link(appointment_id: Uuid) -> String {
    format!("/appointments/{}", appointment_id)
}

fn cancellation_message(appointment: &Appointment) -> String {
    match appointment.cancel_reason.as_deref() {
        Some(reason) => format!("Your counselor cancelled the appointment: {}", reason),
        None => "Your appointment was cancelled.".to_string(),
    }
}

/// Runs side effects of committed transitions. Failures are logged and never
/// propagate back into the transition.
#[derive(Clone)]
pub struct SideEffectDispatcher {
    notifications: Arc<dyn NotificationSink>,
    evidence: Arc<dyn EvidenceSink>,
}

impl SideEffectDispatcher {
    pub fn new(notifications: Arc<dyn NotificationSink>, evidence: Arc<dyn EvidenceSink>) -> Self {
        Self { notifications, evidence }
    }

    /// Returns the evidence record when the collaborator accepted it.
    #[instrument(skip(self, event))]
    pub async fn dispatch(&self, event: BookingEvent) -> Option<EvidenceRecord> {
        let (target_type, target_id, summary) = event.evidence();
        let evidence = match self.evidence.record(target_type, target_id, summary).await {
            Ok(record) => {
                debug!("Evidence {} recorded for {} {}", record.id, target_type, target_id);
                Some(record)
            }
            Err(e) => {
                warn!("Failed to record evidence for {} {}: {}", target_type, target_id, e);
                None
            }
        };

        for notification in event.notifications() {
            let recipient = notification.user_id;
            if let Err(e) = self.notifications.notify_in_app(notification).await {
                warn!("Failed to notify {}: {}", recipient, e);
            }
        }

        evidence
    }
}
