use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, NewSchedule, Schedule, ScheduleStatus,
};
use crate::store::{BookingStore, StoreError, StoreResult, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    schedules: HashMap<Uuid, Schedule>,
    appointments: HashMap<Uuid, Appointment>,
}

/// Process-local store. Units of work are serialized on one lock and stage
/// their writes on a copy of the tables that replaces the original on commit.
#[derive(Clone, Default)]
pub struct MemoryBookingStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    appointments
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.tables.lock().await.schedules.get(&id).cloned())
    }

    async fn list_schedules_by_counselor(
        &self,
        counselor_id: Uuid,
        status: Option<ScheduleStatus>,
    ) -> StoreResult<Vec<Schedule>> {
        let tables = self.tables.lock().await;
        let mut schedules: Vec<Schedule> = tables
            .schedules
            .values()
            .filter(|s| s.counselor_id == counselor_id)
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.start_time);
        Ok(schedules)
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.lock().await.appointments.get(&id).cloned())
    }

    async fn list_appointments_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables.appointments.values().filter(|a| a.user_id == user_id).cloned().collect(),
        ))
    }

    async fn list_appointments_by_counselor(
        &self,
        counselor_id: Uuid,
    ) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .appointments
                .values()
                .filter(|a| a.counselor_id == counselor_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_all_appointments(&self) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(tables.appointments.values().cloned().collect()))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

impl MemoryUnitOfWork {
    fn schedule_mut(&mut self, id: Uuid) -> StoreResult<&mut Schedule> {
        self.staged
            .schedules
            .get_mut(&id)
            .ok_or(StoreError::Missing("schedule", id))
    }

    fn appointment_mut(&mut self, id: Uuid) -> StoreResult<&mut Appointment> {
        self.staged
            .appointments
            .get_mut(&id)
            .ok_or(StoreError::Missing("appointment", id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_schedule(&mut self, schedule: NewSchedule) -> StoreResult<Schedule> {
        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            counselor_id: schedule.counselor_id,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
            mode: schedule.mode,
            location: schedule.location,
            status: ScheduleStatus::Available,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.staged.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn lock_schedule(&mut self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.staged.schedules.get(&id).cloned())
    }

    async fn claim_schedule(&mut self, id: Uuid) -> StoreResult<bool> {
        match self.staged.schedules.get_mut(&id) {
            Some(schedule) if schedule.status == ScheduleStatus::Available => {
                schedule.status = ScheduleStatus::Booked;
                schedule.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_schedule_status(
        &mut self,
        id: Uuid,
        status: ScheduleStatus,
        cancel_reason: Option<String>,
    ) -> StoreResult<Schedule> {
        let schedule = self.schedule_mut(id)?;
        schedule.status = status;
        schedule.cancel_reason = cancel_reason;
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn insert_appointment(&mut self, appointment: NewAppointment) -> StoreResult<Appointment> {
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            user_id: appointment.user_id,
            counselor_id: appointment.counselor_id,
            schedule_id: appointment.schedule_id,
            status: AppointmentStatus::Booked,
            user_note: appointment.user_note,
            counselor_note: None,
            cancel_reason: None,
            cancelled_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.staged.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn lock_appointment(&mut self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.staged.appointments.get(&id).cloned())
    }

    async fn find_booked_appointment_for_schedule(
        &mut self,
        schedule_id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        Ok(self
            .staged
            .appointments
            .values()
            .find(|a| a.schedule_id == schedule_id && a.status == AppointmentStatus::Booked)
            .cloned())
    }

    async fn set_appointment_status(
        &mut self,
        id: Uuid,
        status: AppointmentStatus,
        cancel_reason: Option<String>,
    ) -> StoreResult<Appointment> {
        let now = Utc::now();
        let appointment = self.appointment_mut(id)?;
        let (cancelled_at, completed_at) = status.lifecycle_timestamps(now);
        appointment.status = status;
        appointment.cancel_reason = cancel_reason;
        appointment.cancelled_at = cancelled_at;
        appointment.completed_at = completed_at;
        appointment.updated_at = now;
        Ok(appointment.clone())
    }

    async fn set_counselor_note(&mut self, id: Uuid, note: Option<String>) -> StoreResult<Appointment> {
        let appointment = self.appointment_mut(id)?;
        appointment.counselor_note = note;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleMode;
    use chrono::Duration;

    fn slot(counselor_id: Uuid) -> NewSchedule {
        let start = Utc::now() + Duration::days(1);
        NewSchedule {
            counselor_id,
            start_time: start,
            end_time: start + Duration::hours(1),
            mode: ScheduleMode::Online,
            location: None,
        }
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let store = MemoryBookingStore::new();
        let counselor_id = Uuid::new_v4();

        let mut uow = store.begin().await.unwrap();
        let schedule = uow.insert_schedule(slot(counselor_id)).await.unwrap();
        drop(uow);

        assert!(store.get_schedule(schedule.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_only_succeeds_on_available_slot() {
        let store = MemoryBookingStore::new();
        let mut uow = store.begin().await.unwrap();
        let schedule = uow.insert_schedule(slot(Uuid::new_v4())).await.unwrap();

        assert!(uow.claim_schedule(schedule.id).await.unwrap());
        assert!(!uow.claim_schedule(schedule.id).await.unwrap());
        assert!(!uow.claim_schedule(Uuid::new_v4()).await.unwrap());
        uow.commit().await.unwrap();

        let stored = store.get_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Booked);
    }

    #[tokio::test]
    async fn status_change_stamps_lifecycle_timestamps() {
        let store = MemoryBookingStore::new();
        let mut uow = store.begin().await.unwrap();
        let schedule = uow.insert_schedule(slot(Uuid::new_v4())).await.unwrap();
        let appointment = uow
            .insert_appointment(NewAppointment {
                user_id: Uuid::new_v4(),
                counselor_id: schedule.counselor_id,
                schedule_id: schedule.id,
                user_note: None,
            })
            .await
            .unwrap();

        let completed = uow
            .set_appointment_status(appointment.id, AppointmentStatus::Completed, None)
            .await
            .unwrap();
        assert!(completed.completed_at.is_some());
        assert!(completed.cancelled_at.is_none());

        let cancelled = uow
            .set_appointment_status(appointment.id, AppointmentStatus::CancelledByUser, Some("busy".into()))
            .await
            .unwrap();
        assert!(cancelled.cancelled_at.is_some());
        assert!(cancelled.completed_at.is_none());
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("busy"));
    }
}
