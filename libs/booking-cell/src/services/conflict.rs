use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;
use shared_models::scheduling::{DayOfWeek, SchedulingError, TimeSlot};

use crate::models::BookingError;

/// Pre-commit validation for appointment creation.
///
/// All three checks are check-then-act against shared state; the
/// storage layer's uniqueness constraint on
/// (doctor_id, appointment_date, appointment_time) closes the
/// remaining race at commit time.
pub struct ConflictChecker {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, serde::Deserialize)]
struct AvailabilityRow {
    is_available: bool,
    slots: Vec<TimeSlot>,
}

impl ConflictChecker {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Validate a requested (doctor, patient, date, time) booking.
    ///
    /// Order: doctor double-booking, patient double-booking, then slot
    /// existence against the stored availability record. The slot
    /// check reads the record's *stored* status, not a live
    /// recomputation.
    pub async fn check(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        date: NaiveDate,
        time: &str,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        debug!(
            "Checking booking conflicts for doctor {} at {} {}",
            doctor_id, date, time
        );

        if self
            .has_occupying_appointment("doctor_id", doctor_id, date, time, auth_token)
            .await?
        {
            warn!("Doctor {} already booked at {} {}", doctor_id, date, time);
            return Err(SchedulingError::DoctorDoubleBooked.into());
        }

        if self
            .has_occupying_appointment("patient_id", patient_id, date, time, auth_token)
            .await?
        {
            warn!("Patient {} already booked at {} {}", patient_id, date, time);
            return Err(SchedulingError::PatientDoubleBooked.into());
        }

        self.check_slot_exists(doctor_id, date, time, auth_token).await
    }

    async fn has_occupying_appointment(
        &self,
        owner_column: &str,
        owner_id: Uuid,
        date: NaiveDate,
        time: &str,
        auth_token: &str,
    ) -> Result<bool, BookingError> {
        let path = format!(
            "/rest/v1/appointments?{}=eq.{}&appointment_date=eq.{}&appointment_time=eq.{}&status=in.(pending,confirmed)&select=id",
            owner_column, owner_id, date, time
        );

        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(!existing.is_empty())
    }

    /// The requested time must appear in the doctor's availability
    /// record for that weekday, with the day open and the stored slot
    /// not already `booked`.
    async fn check_slot_exists(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &str,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let day = DayOfWeek::of_date(date);
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}&select=is_available,slots",
            doctor_id, day
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => return Err(SchedulingError::UnavailableSlotRequested.into()),
        };

        let availability: AvailabilityRow = serde_json::from_value(row)
            .map_err(|e| BookingError::Database(format!("Failed to parse availability: {}", e)))?;

        if !availability.is_available {
            return Err(SchedulingError::UnavailableSlotRequested.into());
        }

        let slot_bookable = availability
            .slots
            .iter()
            .any(|slot| slot.start_time == time && !slot.is_booked());

        if !slot_bookable {
            return Err(SchedulingError::UnavailableSlotRequested.into());
        }

        Ok(())
    }
}
