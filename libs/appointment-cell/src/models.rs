// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::store::StoreError;

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

/// A bookable time slot published by a counselor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub counselor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: ScheduleMode,
    pub location: Option<String>,
    pub status: ScheduleStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleMode {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Available,
    Booked,
    Cancelled,
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleMode::Online => write!(f, "ONLINE"),
            ScheduleMode::Offline => write!(f, "OFFLINE"),
        }
    }
}

impl FromStr for ScheduleMode {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ONLINE" => Ok(ScheduleMode::Online),
            "OFFLINE" => Ok(ScheduleMode::Offline),
            other => Err(StoreError::Corrupt(format!("unknown schedule mode {}", other))),
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Available => write!(f, "AVAILABLE"),
            ScheduleStatus::Booked => write!(f, "BOOKED"),
            ScheduleStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AVAILABLE" => Ok(ScheduleStatus::Available),
            "BOOKED" => Ok(ScheduleStatus::Booked),
            "CANCELLED" => Ok(ScheduleStatus::Cancelled),
            other => Err(StoreError::Corrupt(format!("unknown schedule status {}", other))),
        }
    }
}

/// Fields for a schedule insert. The range is validated before it reaches a store.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub counselor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: ScheduleMode,
    pub location: Option<String>,
}

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

/// A client's claim on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub counselor_id: Uuid,
    pub schedule_id: Uuid,
    pub status: AppointmentStatus,
    pub user_note: Option<String>,
    pub counselor_note: Option<String>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Booked,
    CancelledByUser,
    CancelledByCounselor,
    Completed,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Booked)
    }

    /// `(cancelled_at, completed_at)` stamped when a row enters this status.
    pub fn lifecycle_timestamps(
        &self,
        now: DateTime<Utc>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self {
            AppointmentStatus::CancelledByUser | AppointmentStatus::CancelledByCounselor => {
                (Some(now), None)
            }
            AppointmentStatus::Completed => (None, Some(now)),
            AppointmentStatus::Booked => (None, None),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "BOOKED"),
            AppointmentStatus::CancelledByUser => write!(f, "CANCELLED_BY_USER"),
            AppointmentStatus::CancelledByCounselor => write!(f, "CANCELLED_BY_COUNSELOR"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "BOOKED" => Ok(AppointmentStatus::Booked),
            "CANCELLED_BY_USER" => Ok(AppointmentStatus::CancelledByUser),
            "CANCELLED_BY_COUNSELOR" => Ok(AppointmentStatus::CancelledByCounselor),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            other => Err(StoreError::Corrupt(format!("unknown appointment status {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub user_id: Uuid,
    pub counselor_id: Uuid,
    pub schedule_id: Uuid,
    pub user_note: Option<String>,
}

// ==============================================================================
// EVIDENCE & NOTIFICATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceTarget {
    Appointment,
    Schedule,
}

impl fmt::Display for EvidenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceTarget::Appointment => write!(f, "APPOINTMENT"),
            EvidenceTarget::Schedule => write!(f, "SCHEDULE"),
        }
    }
}

/// Append-only audit placeholder awaiting external verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceRecord {
    pub id: Uuid,
    pub target_type: EvidenceTarget,
    pub target_id: Uuid,
    pub summary: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub link: String,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub counselor_id: Uuid,
    pub schedule_id: Uuid,
    pub user_note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCounselorNoteRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: ScheduleMode,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelScheduleRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleQuery {
    pub status: Option<ScheduleStatus>,
}

/// Result of a committed booking. Evidence is `None` when the collaborator failed.
#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub evidence: Option<EvidenceRecord>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Schedule is no longer available")]
    Conflict,

    #[error("Schedule does not belong to the requested counselor")]
    Mismatch,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Transition not allowed from status {0}")]
    InvalidState(String),

    #[error("Schedule end time must be after its start time")]
    InvalidRange,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl AppointmentError {
    pub fn code(&self) -> &'static str {
        match self {
            AppointmentError::NotFound(_) => "NOT_FOUND",
            AppointmentError::Conflict => "CONFLICT",
            AppointmentError::Mismatch => "MISMATCH",
            AppointmentError::Forbidden(_) => "FORBIDDEN",
            AppointmentError::InvalidState(_) => "INVALID_STATE",
            AppointmentError::InvalidRange => "INVALID_RANGE",
            AppointmentError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppointmentError::NotFound(_) => StatusCode::NOT_FOUND,
            AppointmentError::Conflict | AppointmentError::InvalidState(_) => StatusCode::CONFLICT,
            AppointmentError::Mismatch | AppointmentError::InvalidRange => StatusCode::BAD_REQUEST,
            AppointmentError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppointmentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppointmentError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Storage details stay in the logs.
        let message = match &self {
            AppointmentError::Store(e) => {
                tracing::error!("Storage failure: {}", e);
                "Internal storage error".to_string()
            }
            other => {
                tracing::warn!("Request rejected: {}: {}", status, other);
                other.to_string()
            }
        };

        (status, Json(json!({
            "error": message,
            "code": self.code()
        }))).into_response()
    }
}
