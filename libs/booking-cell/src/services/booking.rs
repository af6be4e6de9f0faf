use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;
use shared_models::scheduling::AppointmentStatus;

use crate::models::{
    Appointment, AppointmentListQuery, BookingError, CreateAppointmentRequest,
};
use crate::services::conflict::ConflictChecker;

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    conflicts: ConflictChecker,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let conflicts = ConflictChecker::new(Arc::clone(&supabase));
        Self { supabase, conflicts }
    }

    /// Create an appointment for a patient.
    ///
    /// Runs the full conflict check, then inserts with status
    /// `pending`. No slot field is written here; the slot shows as
    /// `booked` the next time statuses are computed from the live
    /// appointment list. A uniqueness violation at commit is surfaced
    /// as a double-booking, same as the pre-check.
    pub async fn create_appointment(
        &self,
        patient_id: Uuid,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        self.conflicts
            .check(
                request.doctor_id,
                patient_id,
                request.appointment_date,
                &request.appointment_time,
                auth_token,
            )
            .await?;

        let appointment_number = self.next_appointment_number(auth_token).await?;

        let body = json!({
            "id": Uuid::new_v4(),
            "appointment_number": appointment_number,
            "patient_id": patient_id,
            "doctor_id": request.doctor_id,
            "appointment_date": request.appointment_date,
            "appointment_time": request.appointment_time,
            "duration_minutes": 30,
            "appointment_type": request.appointment_type,
            "status": AppointmentStatus::Pending,
            "chief_complaint": request.chief_complaint,
            "patient_notes": request.patient_notes,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;

        let appointment = parse_appointment(result.into_iter().next())?;
        info!(
            "Appointment {} created for doctor {} at {} {}",
            appointment.appointment_number,
            appointment.doctor_id,
            appointment.appointment_date,
            appointment.appointment_time
        );

        Ok(appointment)
    }

    /// List appointments visible to the caller: patients see their
    /// own, doctors see their schedule.
    pub async fn list_appointments(
        &self,
        user: &User,
        query: &AppointmentListQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let mut parts = Vec::new();

        let caller_id = parse_caller_id(user)?;
        if user.is_doctor() {
            parts.push(format!("doctor_id=eq.{}", caller_id));
        } else if !user.is_admin() {
            parts.push(format!("patient_id=eq.{}", caller_id));
        }

        if let Some(status) = query.status {
            parts.push(format!("status=eq.{}", status));
        }
        if let Some(date) = query.appointment_date {
            parts.push(format!("appointment_date=eq.{}", date));
        }
        if let Some(doctor_id) = query.doctor_id {
            parts.push(format!("doctor_id=eq.{}", doctor_id));
        }

        parts.push("order=appointment_date.desc,appointment_time.desc".to_string());

        let path = format!("/rest/v1/appointments?{}", parts.join("&"));
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    BookingError::Database(format!("Failed to parse appointments: {}", e))
                })
            })
            .collect()
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let appointment = parse_appointment(result.into_iter().next())?;
        ensure_participant(user, &appointment)?;

        Ok(appointment)
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        // Fetch first so the permission check runs before any write.
        self.get_appointment(appointment_id, user, auth_token).await?;

        let body = json!({
            "status": status,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_appointment(appointment_id, body, auth_token).await
    }

    /// Cancel an appointment. Cancellation moves the appointment out
    /// of the occupying statuses, so the slot frees itself on the next
    /// status recompute without any slot write.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        self.get_appointment(appointment_id, user, auth_token).await?;

        let body = json!({
            "status": AppointmentStatus::Cancelled,
            "cancelled_at": Utc::now().to_rfc3339(),
            "cancellation_reason": reason,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_appointment(appointment_id, body, auth_token).await
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;

        parse_appointment(result.into_iter().next())
    }

    async fn next_appointment_number(&self, auth_token: &str) -> Result<String, BookingError> {
        let existing: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/appointments?select=id",
                Some(auth_token),
                None,
            )
            .await?;

        debug!("Generating appointment number after {} rows", existing.len());
        Ok(format!("APT-{:06}", existing.len() + 1))
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

fn parse_caller_id(user: &User) -> Result<Uuid, BookingError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| BookingError::Database(format!("Invalid caller id: {}", user.id)))
}

fn parse_appointment(row: Option<Value>) -> Result<Appointment, BookingError> {
    let row = row.ok_or(BookingError::NotFound)?;
    serde_json::from_value(row)
        .map_err(|e| BookingError::Database(format!("Failed to parse appointment: {}", e)))
}

fn ensure_participant(user: &User, appointment: &Appointment) -> Result<(), BookingError> {
    if user.is_admin() {
        return Ok(());
    }

    let caller_id = parse_caller_id(user)?;
    if appointment.doctor_id == caller_id || appointment.patient_id == caller_id {
        Ok(())
    } else {
        Err(BookingError::Forbidden)
    }
}
