//! `PostgreSQL` booking store.
//!
//! Booking claims a slot with `SELECT ... FOR UPDATE` followed by a
//! conditional `UPDATE ... WHERE status = 'AVAILABLE'`, and inserts the
//! appointment on the same transaction. A partial unique index on
//! `appointments(schedule_id) WHERE status = 'BOOKED'` backs this up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, NewSchedule, Schedule, ScheduleStatus,
};
use crate::store::{BookingStore, StoreError, StoreResult, UnitOfWork};

const SCHEDULE_COLUMNS: &str = "id, counselor_id, start_time, end_time, mode, location, status, \
     cancel_reason, created_at, updated_at";

const APPOINTMENT_COLUMNS: &str = "id, user_id, counselor_id, schedule_id, status, user_note, \
     counselor_note, cancel_reason, cancelled_at, completed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    counselor_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    mode: String,
    location: Option<String>,
    status: String,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Schedule {
            id: row.id,
            counselor_id: row.counselor_id,
            start_time: row.start_time,
            end_time: row.end_time,
            mode: row.mode.parse()?,
            location: row.location,
            status: row.status.parse()?,
            cancel_reason: row.cancel_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    user_id: Uuid,
    counselor_id: Uuid,
    schedule_id: Uuid,
    status: String,
    user_note: Option<String>,
    counselor_note: Option<String>,
    cancel_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: row.id,
            user_id: row.user_id,
            counselor_id: row.counselor_id,
            schedule_id: row.schedule_id,
            status: row.status.parse()?,
            user_note: row.user_note,
            counselor_note: row.counselor_note,
            cancel_reason: row.cancel_reason,
            cancelled_at: row.cancelled_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or upgrade the `schedules` and `appointments` tables.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn list_appointments_where(
        &self,
        filter: &str,
        value: Option<Uuid>,
    ) -> StoreResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments {filter} ORDER BY created_at DESC"
        );
        let mut query = sqlx::query_as::<_, AppointmentRow>(&sql);
        if let Some(value) = value {
            query = query.bind(value);
        }
        collect(query.fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1");
        sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Schedule::try_from)
            .transpose()
    }

    async fn list_schedules_by_counselor(
        &self,
        counselor_id: Uuid,
        status: Option<ScheduleStatus>,
    ) -> StoreResult<Vec<Schedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules \
             WHERE counselor_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY start_time"
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(counselor_id)
            .bind(status.map(|s| s.to_string()))
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1");
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn list_appointments_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Appointment>> {
        self.list_appointments_where("WHERE user_id = $1", Some(user_id)).await
    }

    async fn list_appointments_by_counselor(
        &self,
        counselor_id: Uuid,
    ) -> StoreResult<Vec<Appointment>> {
        self.list_appointments_where("WHERE counselor_id = $1", Some(counselor_id)).await
    }

    async fn list_all_appointments(&self) -> StoreResult<Vec<Appointment>> {
        self.list_appointments_where("", None).await
    }
}

/// Wraps one database transaction. Dropping it without commit rolls back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn insert_schedule(&mut self, schedule: NewSchedule) -> StoreResult<Schedule> {
        let sql = format!(
            "INSERT INTO schedules (id, counselor_id, start_time, end_time, mode, location, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'AVAILABLE') \
             RETURNING {SCHEDULE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(schedule.counselor_id)
            .bind(schedule.start_time)
            .bind(schedule.end_time)
            .bind(schedule.mode.to_string())
            .bind(schedule.location)
            .fetch_one(&mut *self.tx)
            .await?;
        row.try_into()
    }

    async fn lock_schedule(&mut self, id: Uuid) -> StoreResult<Option<Schedule>> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Schedule::try_from)
            .transpose()
    }

    async fn claim_schedule(&mut self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE schedules SET status = 'BOOKED', updated_at = NOW() \
             WHERE id = $1 AND status = 'AVAILABLE'",
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        debug!("Claim on schedule {} affected {} rows", id, result.rows_affected());
        Ok(result.rows_affected() == 1)
    }

    async fn set_schedule_status(
        &mut self,
        id: Uuid,
        status: ScheduleStatus,
        cancel_reason: Option<String>,
    ) -> StoreResult<Schedule> {
        let sql = format!(
            "UPDATE schedules SET status = $2, cancel_reason = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {SCHEDULE_COLUMNS}"
        );
        sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(id)
            .bind(status.to_string())
            .bind(cancel_reason)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::Missing("schedule", id))?
            .try_into()
    }

    async fn insert_appointment(&mut self, appointment: NewAppointment) -> StoreResult<Appointment> {
        let sql = format!(
            "INSERT INTO appointments (id, user_id, counselor_id, schedule_id, status, user_note) \
             VALUES ($1, $2, $3, $4, 'BOOKED', $5) \
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(appointment.user_id)
            .bind(appointment.counselor_id)
            .bind(appointment.schedule_id)
            .bind(appointment.user_note)
            .fetch_one(&mut *self.tx)
            .await?;
        row.try_into()
    }

    async fn lock_appointment(&mut self, id: Uuid) -> StoreResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn find_booked_appointment_for_schedule(
        &mut self,
        schedule_id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
             WHERE schedule_id = $1 AND status = 'BOOKED' FOR UPDATE"
        );
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(schedule_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn set_appointment_status(
        &mut self,
        id: Uuid,
        status: AppointmentStatus,
        cancel_reason: Option<String>,
    ) -> StoreResult<Appointment> {
        let (cancelled_at, completed_at) = status.lifecycle_timestamps(Utc::now());
        let sql = format!(
            "UPDATE appointments \
             SET status = $2, cancel_reason = $3, cancelled_at = $4, completed_at = $5, updated_at = NOW() \
             WHERE id = $1 RETURNING {APPOINTMENT_COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(status.to_string())
            .bind(cancel_reason)
            .bind(cancelled_at)
            .bind(completed_at)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::Missing("appointment", id))?
            .try_into()
    }

    async fn set_counselor_note(&mut self, id: Uuid, note: Option<String>) -> StoreResult<Appointment> {
        let sql = format!(
            "UPDATE appointments SET counselor_note = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {APPOINTMENT_COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(note)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::Missing("appointment", id))?
            .try_into()
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PostgresUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
