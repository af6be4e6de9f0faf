use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::scheduling::DayOfWeek;

use crate::models::{
    AddSlotRequest, AvailabilityResponse, RemoveSlotRequest, SetAvailabilityRequest, SlotQuery,
    WeeklyQuery,
};
use crate::services::AvailabilityService;

fn parse_doctor_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid doctor identifier".to_string()))
}

fn parse_day(day: &str) -> Result<DayOfWeek, AppError> {
    DayOfWeek::from_str(day).map_err(AppError::BadRequest)
}

/// Public endpoint: bookable slots for a doctor on a concrete date.
/// Used by patients when picking a time during booking.
#[axum::debug_handler]
pub async fn get_doctor_slots_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slots = service
        .slots_for_date(doctor_id, query.appointment_date, Utc::now().naive_utc(), None)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "appointment_date": query.appointment_date,
        "slots": slots,
    })))
}

/// Weekly view for the authenticated doctor, with live slot statuses.
#[axum::debug_handler]
pub async fn get_weekly_availability(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<WeeklyQuery>,
) -> Result<Json<Vec<AvailabilityResponse>>, AppError> {
    let doctor_id = parse_doctor_id(&user)?;
    let service = AvailabilityService::new(&state);

    let responses = service
        .weekly_availability(
            doctor_id,
            query.reference_date,
            Utc::now().naive_utc(),
            Some(auth.token()),
        )
        .await?;

    Ok(Json(responses))
}

#[axum::debug_handler]
pub async fn set_availability(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<SetAvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let doctor_id = parse_doctor_id(&user)?;
    let service = AvailabilityService::new(&state);

    let record = service
        .set_availability(doctor_id, request, Some(auth.token()))
        .await?;

    let slots = record.slots.clone();
    Ok(Json(AvailabilityResponse::from_record(&record, slots)))
}

#[axum::debug_handler]
pub async fn add_slot(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(day): Path<String>,
    Json(request): Json<AddSlotRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let doctor_id = parse_doctor_id(&user)?;
    let day = parse_day(&day)?;
    let service = AvailabilityService::new(&state);

    let record = service
        .add_slot(
            doctor_id,
            day,
            &request.start_time,
            &request.end_time,
            Some(auth.token()),
        )
        .await?;

    let slots = record.slots.clone();
    Ok(Json(AvailabilityResponse::from_record(&record, slots)))
}

#[axum::debug_handler]
pub async fn remove_slot(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(day): Path<String>,
    Json(request): Json<RemoveSlotRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let doctor_id = parse_doctor_id(&user)?;
    let day = parse_day(&day)?;
    let service = AvailabilityService::new(&state);

    let record = service
        .remove_slot(doctor_id, day, &request.start_time, Some(auth.token()))
        .await?;

    let slots = record.slots.clone();
    Ok(Json(AvailabilityResponse::from_record(&record, slots)))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(day): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = parse_doctor_id(&user)?;
    let day = parse_day(&day)?;
    let service = AvailabilityService::new(&state);

    service
        .delete_availability(doctor_id, day, Some(auth.token()))
        .await?;

    Ok(Json(json!({ "message": "Availability deleted" })))
}
