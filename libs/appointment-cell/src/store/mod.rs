//! Schedule and appointment persistence.
//!
//! Reads go through [`BookingStore`]. Every write happens inside a
//! [`UnitOfWork`] opened with [`BookingStore::begin`]; dropping a unit of work
//! without calling [`UnitOfWork::commit`] discards all of its writes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, NewSchedule, Schedule, ScheduleStatus,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryBookingStore;
pub use postgres::PostgresBookingStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0} {1} vanished inside the transaction")]
    Missing(&'static str, Uuid),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Open a transactional unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>>;

    /// Schedules of one counselor ordered by start time.
    async fn list_schedules_by_counselor(
        &self,
        counselor_id: Uuid,
        status: Option<ScheduleStatus>,
    ) -> StoreResult<Vec<Schedule>>;

    async fn list_available_schedules(&self, counselor_id: Uuid) -> StoreResult<Vec<Schedule>> {
        self.list_schedules_by_counselor(counselor_id, Some(ScheduleStatus::Available))
            .await
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;

    /// Newest first, as are the other appointment listings.
    async fn list_appointments_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Appointment>>;

    async fn list_appointments_by_counselor(
        &self,
        counselor_id: Uuid,
    ) -> StoreResult<Vec<Appointment>>;

    async fn list_all_appointments(&self) -> StoreResult<Vec<Appointment>>;
}

/// Writes for one transition. Schedule and appointment changes made through
/// the same unit of work commit or roll back together.
///
/// Callers lock the schedule row before any appointment row on it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_schedule(&mut self, schedule: NewSchedule) -> StoreResult<Schedule>;

    /// Read a schedule and hold its row lock until the unit of work ends.
    async fn lock_schedule(&mut self, id: Uuid) -> StoreResult<Option<Schedule>>;

    /// Move an AVAILABLE schedule to BOOKED. Returns false when no row matched.
    async fn claim_schedule(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn set_schedule_status(
        &mut self,
        id: Uuid,
        status: ScheduleStatus,
        cancel_reason: Option<String>,
    ) -> StoreResult<Schedule>;

    async fn insert_appointment(&mut self, appointment: NewAppointment) -> StoreResult<Appointment>;

    async fn lock_appointment(&mut self, id: Uuid) -> StoreResult<Option<Appointment>>;

    async fn find_booked_appointment_for_schedule(
        &mut self,
        schedule_id: Uuid,
    ) -> StoreResult<Option<Appointment>>;

    /// Also stamps `cancelled_at` / `completed_at` for the target status.
    async fn set_appointment_status(
        &mut self,
        id: Uuid,
        status: AppointmentStatus,
        cancel_reason: Option<String>,
    ) -> StoreResult<Appointment>;

    async fn set_counselor_note(&mut self, id: Uuid, note: Option<String>) -> StoreResult<Appointment>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
