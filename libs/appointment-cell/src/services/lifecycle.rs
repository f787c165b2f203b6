// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus, ScheduleStatus};

/// Legal transitions of the paired appointment/schedule state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating appointment transition {} -> {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid appointment transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidState(current_status.to_string()));
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        if current_status.is_terminal() {
            return Vec::new();
        }

        vec![
            AppointmentStatus::CancelledByUser,
            AppointmentStatus::CancelledByCounselor,
            AppointmentStatus::Completed,
        ]
    }

    pub fn validate_schedule_transition(
        &self,
        current_status: ScheduleStatus,
        new_status: ScheduleStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating schedule transition {} -> {}", current_status, new_status);

        if !self.get_valid_schedule_transitions(current_status).contains(&new_status) {
            warn!("Invalid schedule transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidState(current_status.to_string()));
        }

        Ok(())
    }

    pub fn get_valid_schedule_transitions(&self, current_status: ScheduleStatus) -> Vec<ScheduleStatus> {
        match current_status {
            ScheduleStatus::Available => vec![ScheduleStatus::Booked, ScheduleStatus::Cancelled],
            ScheduleStatus::Booked => vec![ScheduleStatus::Available, ScheduleStatus::Cancelled],
            ScheduleStatus::Cancelled => vec![],
        }
    }
}
