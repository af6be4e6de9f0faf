use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::scheduling::{BookingRef, DayOfWeek, SlotStatus, TimeSlot};

use crate::models::{
    AvailabilityError, AvailabilityResponse, DoctorAvailability, SetAvailabilityRequest,
};
use crate::services::slots;

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Set a day's working hours from declared ranges.
    ///
    /// Generated slots are merged with the stored row so that live
    /// bookings survive any edit, then the row is created or updated
    /// in place (one row per doctor and weekday).
    pub async fn set_availability(
        &self,
        doctor_id: Uuid,
        request: SetAvailabilityRequest,
        auth_token: Option<&str>,
    ) -> Result<DoctorAvailability, AvailabilityError> {
        debug!("Setting availability for doctor {} on {}", doctor_id, request.day_of_week);

        let new_slots =
            slots::generate_slots(&request.time_ranges, slots::DEFAULT_SLOT_DURATION_MINUTES)?;

        let existing = self
            .get_day_record(doctor_id, request.day_of_week, auth_token)
            .await?;

        let bookings = self
            .get_occupying_appointments(doctor_id, None, auth_token)
            .await?;
        let target = slots::next_occurrence(request.day_of_week, Utc::now().date_naive());
        let booked_map = build_booked_map(&bookings, request.day_of_week, target);

        let existing_slots = existing
            .as_ref()
            .map(|record| record.slots.as_slice())
            .unwrap_or(&[]);
        let merged = slots::merge_slots(&new_slots, existing_slots, &booked_map)?;

        match existing {
            Some(record) => {
                let path = format!(
                    "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}",
                    doctor_id, request.day_of_week
                );
                let body = json!({
                    "is_available": request.is_available,
                    "slots": merged,
                    "updated_at": Utc::now().to_rfc3339(),
                });
                let result: Vec<Value> = self
                    .supabase
                    .request_with_headers(
                        Method::PATCH,
                        &path,
                        auth_token,
                        Some(body),
                        Some(representation_headers()),
                    )
                    .await?;
                parse_row(result.into_iter().next(), record.id)
            }
            None => {
                let body = json!({
                    "doctor_id": doctor_id,
                    "day_of_week": request.day_of_week,
                    "is_available": request.is_available,
                    "slots": merged,
                    "created_at": Utc::now().to_rfc3339(),
                    "updated_at": Utc::now().to_rfc3339(),
                });
                let result: Vec<Value> = self
                    .supabase
                    .request_with_headers(
                        Method::POST,
                        "/rest/v1/doctor_availability",
                        auth_token,
                        Some(body),
                        Some(representation_headers()),
                    )
                    .await?;
                parse_row(result.into_iter().next(), doctor_id)
            }
        }
    }

    /// Weekly view: every stored day with live slot statuses.
    pub async fn weekly_availability(
        &self,
        doctor_id: Uuid,
        reference_date: Option<NaiveDate>,
        now: NaiveDateTime,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityResponse>, AvailabilityError> {
        debug!("Fetching weekly availability for doctor {}", doctor_id);

        let records = self.get_all_records(doctor_id, auth_token).await?;
        let bookings = self
            .get_occupying_appointments(doctor_id, None, auth_token)
            .await?;

        let mut responses = Vec::with_capacity(records.len());
        for record in records {
            let day_bookings: Vec<BookingRef> = bookings
                .iter()
                .filter(|apt| DayOfWeek::of_date(apt.date) == record.day_of_week)
                .cloned()
                .collect();

            let computed = slots::compute_statuses(
                &record.slots,
                record.day_of_week,
                &day_bookings,
                now,
                reference_date,
                None,
            )?;

            responses.push(AvailabilityResponse::from_record(&record, computed));
        }

        Ok(responses)
    }

    /// Patient-facing query: bookable slots for one doctor on one
    /// concrete date (date-exact mode, only `available` returned).
    pub async fn slots_for_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        now: NaiveDateTime,
        auth_token: Option<&str>,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        debug!("Calculating bookable slots for doctor {} on {}", doctor_id, date);

        let day = DayOfWeek::of_date(date);
        let record = match self.get_day_record(doctor_id, day, auth_token).await? {
            Some(record) if record.is_available => record,
            _ => return Ok(vec![]),
        };

        let bookings = self
            .get_occupying_appointments(doctor_id, Some(date), auth_token)
            .await?;

        let computed =
            slots::compute_statuses(&record.slots, day, &bookings, now, None, Some(date))?;

        Ok(computed
            .into_iter()
            .filter(|slot| slot.status == SlotStatus::Available)
            .collect())
    }

    /// Add one or more slots for a single range to an existing day.
    pub async fn add_slot(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        start_time: &str,
        end_time: &str,
        auth_token: Option<&str>,
    ) -> Result<DoctorAvailability, AvailabilityError> {
        let record = self
            .get_day_record(doctor_id, day, auth_token)
            .await?
            .ok_or(AvailabilityError::NotFound)?;

        let updated = slots::add_slot(
            &record.slots,
            start_time,
            end_time,
            slots::DEFAULT_SLOT_DURATION_MINUTES,
        )?;

        self.store_slots(doctor_id, day, updated, auth_token).await
    }

    /// Remove a single slot; booked slots are protected.
    pub async fn remove_slot(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        start_time: &str,
        auth_token: Option<&str>,
    ) -> Result<DoctorAvailability, AvailabilityError> {
        let record = self
            .get_day_record(doctor_id, day, auth_token)
            .await?
            .ok_or(AvailabilityError::NotFound)?;

        let updated = slots::remove_slot(&record.slots, start_time)?;

        self.store_slots(doctor_id, day, updated, auth_token).await
    }

    /// Delete a day's schedule; rejected while it holds booked slots.
    pub async fn delete_availability(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        auth_token: Option<&str>,
    ) -> Result<(), AvailabilityError> {
        let record = self
            .get_day_record(doctor_id, day, auth_token)
            .await?
            .ok_or(AvailabilityError::NotFound)?;

        let booked = record.booked_slot_count();
        if booked > 0 {
            return Err(AvailabilityError::BookedSlotsPresent(booked));
        }

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}",
            doctor_id, day
        );
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, auth_token, None)
            .await?;

        Ok(())
    }

    /// Stored record for one (doctor, weekday), if any. Slots are
    /// normalized on read so the uniqueness/ordering invariant holds
    /// even if the stored JSON drifted.
    pub async fn get_day_record(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        auth_token: Option<&str>,
    ) -> Result<Option<DoctorAvailability>, AvailabilityError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}",
            doctor_id, day
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await?;

        match result.into_iter().next() {
            Some(row) => {
                let mut record: DoctorAvailability = serde_json::from_value(row)
                    .map_err(|e| AvailabilityError::Database(format!("Failed to parse availability: {}", e)))?;
                record.slots = slots::normalize_slots(record.slots)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn get_all_records(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<DoctorAvailability>, AvailabilityError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&order=day_of_week.asc",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await?;

        let mut records = Vec::with_capacity(result.len());
        for row in result {
            let mut record: DoctorAvailability = serde_json::from_value(row)
                .map_err(|e| AvailabilityError::Database(format!("Failed to parse availability: {}", e)))?;
            record.slots = slots::normalize_slots(record.slots)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Occupying (pending or confirmed) appointments for a doctor,
    /// optionally restricted to one date. Read-only input to the
    /// engine; never mutated here.
    async fn get_occupying_appointments(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
        auth_token: Option<&str>,
    ) -> Result<Vec<BookingRef>, AvailabilityError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(pending,confirmed)&select=id,appointment_date,appointment_time,status",
            doctor_id
        );
        if let Some(date) = date {
            path.push_str(&format!("&appointment_date=eq.{}", date));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AvailabilityError::Database(format!("Failed to parse appointments: {}", e))
                })
            })
            .collect()
    }

    async fn store_slots(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        slots: Vec<TimeSlot>,
        auth_token: Option<&str>,
    ) -> Result<DoctorAvailability, AvailabilityError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}",
            doctor_id, day
        );
        let body = json!({
            "slots": slots,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                auth_token,
                Some(body),
                Some(representation_headers()),
            )
            .await?;

        parse_row(result.into_iter().next(), doctor_id)
    }
}

fn representation_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}

/// Bookings that occupy a slot on the given weekday, at or after its
/// next occurrence. Keyed by start time for the merge.
fn build_booked_map(
    bookings: &[BookingRef],
    day: DayOfWeek,
    target: NaiveDate,
) -> HashMap<String, Uuid> {
    bookings
        .iter()
        .filter(|apt| apt.status.is_occupying())
        .filter(|apt| DayOfWeek::of_date(apt.date) == day && apt.date >= target)
        .map(|apt| (apt.time.clone(), apt.id))
        .collect()
}

fn parse_row(
    row: Option<Value>,
    context_id: Uuid,
) -> Result<DoctorAvailability, AvailabilityError> {
    let row = row.ok_or_else(|| {
        AvailabilityError::Database(format!("Empty response writing availability for {}", context_id))
    })?;
    serde_json::from_value(row)
        .map_err(|e| AvailabilityError::Database(format!("Failed to parse availability: {}", e)))
}
