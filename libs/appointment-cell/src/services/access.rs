// libs/appointment-cell/src/services/access.rs
use tracing::warn;

use shared_models::auth::{AuthContext, Role};

use crate::models::{Appointment, AppointmentError, Schedule};

/// Actions gated by role before any ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    BookAppointment,
    CancelAppointment,
    CompleteAppointment,
    EditCounselorNote,
    ManageSchedules,
    ViewAllAppointments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCapabilities {
    pub can_book: bool,
    pub can_cancel: bool,
    pub can_complete: bool,
    pub can_edit_counselor_note: bool,
    pub can_manage_schedules: bool,
    pub can_view_all: bool,
}

impl RoleCapabilities {
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::User => Self {
                can_book: true,
                can_cancel: true,
                can_complete: false,
                can_edit_counselor_note: false,
                can_manage_schedules: false,
                can_view_all: false,
            },
            Role::Counselor => Self {
                can_book: false,
                can_cancel: true,
                can_complete: true,
                can_edit_counselor_note: true,
                can_manage_schedules: true,
                can_view_all: false,
            },
            Role::Admin => Self {
                can_book: false,
                can_cancel: true,
                can_complete: false,
                can_edit_counselor_note: false,
                can_manage_schedules: false,
                can_view_all: true,
            },
        }
    }

    pub const fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::BookAppointment => self.can_book,
            Capability::CancelAppointment => self.can_cancel,
            Capability::CompleteAppointment => self.can_complete,
            Capability::EditCounselorNote => self.can_edit_counselor_note,
            Capability::ManageSchedules => self.can_manage_schedules,
            Capability::ViewAllAppointments => self.can_view_all,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGuard;

impl AccessGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn require(&self, actor: &AuthContext, capability: Capability) -> Result<(), AppointmentError> {
        if RoleCapabilities::for_role(actor.role).allows(capability) {
            return Ok(());
        }

        warn!("{} {} lacks capability {:?}", actor.role, actor.user_id, capability);
        Err(AppointmentError::Forbidden(format!(
            "role {} may not perform {:?}",
            actor.role, capability
        )))
    }

    /// Ownership check for cancellation. Admins act on any appointment.
    pub fn ensure_can_cancel(&self, actor: &AuthContext, appointment: &Appointment) -> Result<(), AppointmentError> {
        self.require(actor, Capability::CancelAppointment)?;

        let owns = match actor.role {
            Role::User => appointment.user_id == actor.user_id,
            Role::Counselor => appointment.counselor_id == actor.user_id,
            Role::Admin => true,
        };

        if !owns {
            warn!("{} {} tried to cancel appointment {} they do not own", actor.role, actor.user_id, appointment.id);
            return Err(AppointmentError::Forbidden("not a party to this appointment".to_string()));
        }

        Ok(())
    }

    /// Completion and counselor notes belong to the appointment's counselor.
    pub fn ensure_counselor_of(
        &self,
        actor: &AuthContext,
        appointment: &Appointment,
        capability: Capability,
    ) -> Result<(), AppointmentError> {
        self.require(actor, capability)?;

        if appointment.counselor_id != actor.user_id {
            warn!("Counselor {} does not own appointment {}", actor.user_id, appointment.id);
            return Err(AppointmentError::Forbidden("appointment belongs to another counselor".to_string()));
        }

        Ok(())
    }

    pub fn ensure_schedule_owner(&self, actor: &AuthContext, schedule: &Schedule) -> Result<(), AppointmentError> {
        self.require(actor, Capability::ManageSchedules)?;

        if schedule.counselor_id != actor.user_id {
            warn!("Counselor {} does not own schedule {}", actor.user_id, schedule.id);
            return Err(AppointmentError::Forbidden("schedule belongs to another counselor".to_string()));
        }

        Ok(())
    }

    pub fn can_view(&self, actor: &AuthContext, appointment: &Appointment) -> bool {
        RoleCapabilities::for_role(actor.role).allows(Capability::ViewAllAppointments)
            || appointment.user_id == actor.user_id
            || appointment.counselor_id == actor.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table_matches_roles() {
        let client = RoleCapabilities::for_role(Role::User);
        assert!(client.allows(Capability::BookAppointment));
        assert!(!client.allows(Capability::CompleteAppointment));
        assert!(!client.allows(Capability::ManageSchedules));

        let counselor = RoleCapabilities::for_role(Role::Counselor);
        assert!(!counselor.allows(Capability::BookAppointment));
        assert!(counselor.allows(Capability::CompleteAppointment));
        assert!(counselor.allows(Capability::EditCounselorNote));
        assert!(counselor.allows(Capability::ManageSchedules));

        let admin = RoleCapabilities::for_role(Role::Admin);
        assert!(admin.allows(Capability::CancelAppointment));
        assert!(admin.allows(Capability::ViewAllAppointments));
        assert!(!admin.allows(Capability::BookAppointment));
    }
}
