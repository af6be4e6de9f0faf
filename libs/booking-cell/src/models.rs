use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_models::scheduling::{AppointmentStatus, SchedulingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Video,
    InPerson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub appointment_number: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    /// Slot start time as `HH:MM`; matches a start time in the
    /// doctor's availability record for that weekday.
    pub appointment_time: String,
    pub duration_minutes: i32,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub chief_complaint: String,
    pub patient_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub appointment_type: AppointmentType,
    pub chief_complaint: String,
    pub patient_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
    pub appointment_date: Option<NaiveDate>,
    pub doctor_id: Option<Uuid>,
}

// Error type for booking operations
#[derive(Error, Debug)]
pub enum BookingError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("Appointment not found")]
    NotFound,

    #[error("Not authorized to access this appointment")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SupabaseError> for BookingError {
    fn from(err: SupabaseError) -> Self {
        match err {
            // A storage-level uniqueness violation on
            // (doctor_id, appointment_date, appointment_time) is the
            // lost side of a booking race. Callers see it exactly as
            // if the pre-check had failed.
            SupabaseError::Conflict(_) => {
                BookingError::Scheduling(SchedulingError::DoctorDoubleBooked)
            }
            other => BookingError::Database(other.to_string()),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Scheduling(scheduling_err) => scheduling_err.into(),
            BookingError::NotFound => AppError::NotFound(message),
            BookingError::Forbidden => AppError::Auth(message),
            BookingError::Database(_) => AppError::Database(message),
        }
    }
}
