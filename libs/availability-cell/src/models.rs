use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_models::scheduling::{DayOfWeek, SchedulingError, TimeSlot};

/// Persisted weekly schedule for one (doctor, weekday) pair. The
/// `doctor_availability` table holds exactly one row per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub is_available: bool,
    pub slots: Vec<TimeSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoctorAvailability {
    pub fn booked_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_booked()).count()
    }
}

/// Declared working range, e.g. 09:00 to 13:00.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: String,
    pub end_time: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAvailabilityRequest {
    pub day_of_week: DayOfWeek,
    #[serde(default = "default_true")]
    pub is_available: bool,
    pub time_ranges: Vec<TimeRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSlotRequest {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveSlotRequest {
    pub start_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub is_available: bool,
    pub slots: Vec<TimeSlot>,
}

impl AvailabilityResponse {
    pub fn from_record(record: &DoctorAvailability, slots: Vec<TimeSlot>) -> Self {
        Self {
            id: record.id,
            doctor_id: record.doctor_id,
            day_of_week: record.day_of_week,
            is_available: record.is_available,
            slots,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub appointment_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeeklyQuery {
    pub reference_date: Option<NaiveDate>,
}

// Error type for availability operations
#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error(transparent)]
    Slot(#[from] SchedulingError),

    #[error("Availability not found for this day")]
    NotFound,

    #[error("Cannot delete availability with {0} booked slot(s). Cancel appointments first.")]
    BookedSlotsPresent(usize),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SupabaseError> for AvailabilityError {
    fn from(err: SupabaseError) -> Self {
        AvailabilityError::Database(err.to_string())
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        let message = err.to_string();
        match err {
            AvailabilityError::Slot(slot_err) => slot_err.into(),
            AvailabilityError::NotFound => AppError::NotFound(message),
            AvailabilityError::BookedSlotsPresent(_) => AppError::BadRequest(message),
            AvailabilityError::Database(_) => AppError::Database(message),
        }
    }
}
