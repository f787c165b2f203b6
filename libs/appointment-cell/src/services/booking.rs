// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::{AuthContext, Role};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingOutcome,
    CreateScheduleRequest, NewAppointment, NewSchedule, Schedule, ScheduleStatus,
};
use crate::services::access::{AccessGuard, Capability};
use crate::services::dispatcher::{BookingEvent, SideEffectDispatcher};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::store::{BookingStore, StoreError};

/// Drives every appointment and schedule transition.
///
/// Each transition runs on its own unit of work: the rows involved are locked,
/// validated and written, then committed together. Side effects are dispatched
/// only after the commit succeeded.
#[derive(Clone)]
pub struct AppointmentBookingService {
    store: Arc<dyn BookingStore>,
    dispatcher: SideEffectDispatcher,
    lifecycle_service: AppointmentLifecycleService,
    access_guard: AccessGuard,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn BookingStore>, dispatcher: SideEffectDispatcher) -> Self {
        Self {
            store,
            dispatcher,
            lifecycle_service: AppointmentLifecycleService::new(),
            access_guard: AccessGuard::new(),
        }
    }

    // ==========================================================================
    // APPOINTMENT TRANSITIONS
    // ==========================================================================

    /// Claim an AVAILABLE schedule for the acting user.
    pub async fn book_appointment(
        &self,
        actor: &AuthContext,
        request: BookAppointmentRequest,
    ) -> Result<BookingOutcome, AppointmentError> {
        self.access_guard.require(actor, Capability::BookAppointment)?;
        info!("Booking schedule {} for user {} with counselor {}",
              request.schedule_id, actor.user_id, request.counselor_id);

        let mut uow = self.store.begin().await?;

        let schedule = uow
            .lock_schedule(request.schedule_id)
            .await?
            .ok_or(AppointmentError::NotFound("Schedule"))?;

        if schedule.status != ScheduleStatus::Available {
            warn!("Schedule {} is {}, booking rejected", schedule.id, schedule.status);
            return Err(AppointmentError::Conflict);
        }

        if schedule.counselor_id != request.counselor_id {
            warn!("Schedule {} belongs to counselor {}, not {}",
                  schedule.id, schedule.counselor_id, request.counselor_id);
            return Err(AppointmentError::Mismatch);
        }

        if !uow.claim_schedule(schedule.id).await? {
            return Err(AppointmentError::Conflict);
        }

        let appointment = uow
            .insert_appointment(NewAppointment {
                user_id: actor.user_id,
                counselor_id: schedule.counselor_id,
                schedule_id: schedule.id,
                user_note: request.user_note,
            })
            .await?;

        uow.commit().await?;
        info!("Appointment {} booked on schedule {}", appointment.id, schedule.id);

        let evidence = self
            .dispatcher
            .dispatch(BookingEvent::AppointmentBooked { appointment: appointment.clone() })
            .await;

        Ok(BookingOutcome { appointment, evidence })
    }

    /// Cancel a BOOKED appointment. Who cancels decides what happens to the slot:
    /// a client (or admin) frees it, a counselor voids it.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        actor: &AuthContext,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {} as {} {}", appointment_id, actor.role, actor.user_id);

        // Rows are always locked schedule first, then appointment.
        let schedule_id = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))?
            .schedule_id;

        let mut uow = self.store.begin().await?;

        let schedule = uow
            .lock_schedule(schedule_id)
            .await?
            .ok_or(AppointmentError::NotFound("Schedule"))?;

        let appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))?;

        if appointment.schedule_id != schedule.id {
            return Err(StoreError::Corrupt(format!(
                "appointment {} moved off schedule {}",
                appointment.id, schedule.id
            ))
            .into());
        }

        if appointment.status != AppointmentStatus::Booked {
            return Err(AppointmentError::InvalidState(appointment.status.to_string()));
        }

        self.access_guard.ensure_can_cancel(actor, &appointment)?;

        let (appointment_status, schedule_status, schedule_reason) = match actor.role {
            Role::Counselor => (
                AppointmentStatus::CancelledByCounselor,
                ScheduleStatus::Cancelled,
                reason.clone(),
            ),
            Role::User | Role::Admin => (
                AppointmentStatus::CancelledByUser,
                ScheduleStatus::Available,
                None,
            ),
        };

        self.lifecycle_service
            .validate_status_transition(appointment.status, appointment_status)?;
        self.lifecycle_service
            .validate_schedule_transition(schedule.status, schedule_status)?;

        let cancelled = uow
            .set_appointment_status(appointment.id, appointment_status, reason)
            .await?;
        uow.set_schedule_status(schedule.id, schedule_status, schedule_reason)
            .await?;

        uow.commit().await?;
        info!("Appointment {} is {}, schedule {} is {}",
              cancelled.id, cancelled.status, schedule.id, schedule_status);

        self.dispatcher
            .dispatch(BookingEvent::AppointmentCancelled {
                appointment: cancelled.clone(),
                cancelled_by: actor.role,
            })
            .await;

        Ok(cancelled)
    }

    /// Mark a BOOKED appointment as held. The schedule stays BOOKED as history.
    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        actor: &AuthContext,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Completing appointment {} as counselor {}", appointment_id, actor.user_id);

        let mut uow = self.store.begin().await?;

        let appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))?;

        self.access_guard
            .ensure_counselor_of(actor, &appointment, Capability::CompleteAppointment)?;

        // A second completion is rejected here
        self.lifecycle_service
            .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;

        let completed = uow
            .set_appointment_status(appointment.id, AppointmentStatus::Completed, None)
            .await?;

        uow.commit().await?;
        info!("Appointment {} completed", completed.id);

        self.dispatcher
            .dispatch(BookingEvent::AppointmentCompleted { appointment: completed.clone() })
            .await;

        Ok(completed)
    }

    /// Free-form counselor note, editable in any status.
    pub async fn update_counselor_note(
        &self,
        appointment_id: Uuid,
        actor: &AuthContext,
        note: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let mut uow = self.store.begin().await?;

        let appointment = uow
            .lock_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))?;

        self.access_guard
            .ensure_counselor_of(actor, &appointment, Capability::EditCounselorNote)?;

        let updated = uow.set_counselor_note(appointment.id, note).await?;
        uow.commit().await?;

        debug!("Counselor note updated on appointment {}", updated.id);
        Ok(updated)
    }

    // ==========================================================================
    // SCHEDULE TRANSITIONS
    // ==========================================================================

    pub async fn create_schedule(
        &self,
        actor: &AuthContext,
        request: CreateScheduleRequest,
    ) -> Result<Schedule, AppointmentError> {
        self.access_guard.require(actor, Capability::ManageSchedules)?;

        if request.end_time <= request.start_time {
            warn!("Rejected schedule with end {} not after start {}", request.end_time, request.start_time);
            return Err(AppointmentError::InvalidRange);
        }

        let mut uow = self.store.begin().await?;
        let schedule = uow
            .insert_schedule(NewSchedule {
                counselor_id: actor.user_id,
                start_time: request.start_time,
                end_time: request.end_time,
                mode: request.mode,
                location: request.location,
            })
            .await?;
        uow.commit().await?;

        info!("Counselor {} published schedule {} ({} - {})",
              actor.user_id, schedule.id, schedule.start_time, schedule.end_time);
        Ok(schedule)
    }

    /// Counselor leave: void the slot. A booking on it is cancelled with it.
    pub async fn cancel_schedule(
        &self,
        schedule_id: Uuid,
        actor: &AuthContext,
        reason: Option<String>,
    ) -> Result<Schedule, AppointmentError> {
        let mut uow = self.store.begin().await?;

        let schedule = uow
            .lock_schedule(schedule_id)
            .await?
            .ok_or(AppointmentError::NotFound("Schedule"))?;

        self.access_guard.ensure_schedule_owner(actor, &schedule)?;
        self.lifecycle_service
            .validate_schedule_transition(schedule.status, ScheduleStatus::Cancelled)?;

        let affected_appointment = match uow.find_booked_appointment_for_schedule(schedule.id).await? {
            Some(booked) => {
                warn!("Schedule {} withdrawn with appointment {} still booked, cancelling it",
                      schedule.id, booked.id);
                Some(
                    uow.set_appointment_status(
                        booked.id,
                        AppointmentStatus::CancelledByCounselor,
                        reason.clone(),
                    )
                    .await?,
                )
            }
            None => None,
        };

        let cancelled = uow
            .set_schedule_status(schedule.id, ScheduleStatus::Cancelled, reason)
            .await?;

        uow.commit().await?;
        info!("Schedule {} cancelled by counselor {}", cancelled.id, actor.user_id);

        self.dispatcher
            .dispatch(BookingEvent::ScheduleCancelled {
                schedule: cancelled.clone(),
                affected_appointment,
            })
            .await;

        Ok(cancelled)
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        actor: &AuthContext,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound("Appointment"))?;

        if !self.access_guard.can_view(actor, &appointment) {
            return Err(AppointmentError::Forbidden("not a party to this appointment".to_string()));
        }

        Ok(appointment)
    }

    /// Clients see their bookings, counselors their sessions, admins everything.
    pub async fn list_appointments(&self, actor: &AuthContext) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = match actor.role {
            Role::User => self.store.list_appointments_by_user(actor.user_id).await?,
            Role::Counselor => self.store.list_appointments_by_counselor(actor.user_id).await?,
            Role::Admin => self.store.list_all_appointments().await?,
        };
        Ok(appointments)
    }

    pub async fn list_schedules(
        &self,
        actor: &AuthContext,
        status: Option<ScheduleStatus>,
    ) -> Result<Vec<Schedule>, AppointmentError> {
        self.access_guard.require(actor, Capability::ManageSchedules)?;
        Ok(self.store.list_schedules_by_counselor(actor.user_id, status).await?)
    }

    pub async fn list_available_schedules(&self, counselor_id: Uuid) -> Result<Vec<Schedule>, AppointmentError> {
        Ok(self.store.list_available_schedules(counselor_id).await?)
    }
}
