use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::NaiveDate;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::{
    AppointmentType, BookingError, CreateAppointmentRequest,
};
use booking_cell::router::appointment_routes;
use booking_cell::services::BookingService;
use shared_config::AppConfig;
use shared_models::scheduling::SchedulingError;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestUser};

fn test_config(mock_server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: mock_server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
    }
}

// 2030-01-07 is a Monday.
fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn create_request(doctor_id: Uuid) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        doctor_id,
        appointment_date: test_date(),
        appointment_time: "09:00".to_string(),
        appointment_type: AppointmentType::Video,
        chief_complaint: "General checkup".to_string(),
        patient_notes: None,
    }
}

async fn mock_no_conflicting_appointments(mock_server: &MockServer, owner_column: &str, id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param(owner_column, format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn mock_open_monday_slot(mock_server: &MockServer, doctor_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("day_of_week", "eq.monday"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "is_available": true,
                "slots": [
                    {
                        "start_time": "09:00",
                        "end_time": "09:30",
                        "status": "available",
                        "appointment_id": null
                    }
                ]
            }
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_create_appointment_doctor_double_booked() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("appointment_time", "eq.09:00"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": Uuid::new_v4()}])),
        )
        .mount(&mock_server)
        .await;

    let result = service
        .create_appointment(patient_id, create_request(doctor_id), "test-token")
        .await;

    assert_matches!(
        result,
        Err(BookingError::Scheduling(SchedulingError::DoctorDoubleBooked))
    );
}

#[tokio::test]
async fn test_create_appointment_patient_double_booked() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    mock_no_conflicting_appointments(&mock_server, "doctor_id", doctor_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": Uuid::new_v4()}])),
        )
        .mount(&mock_server)
        .await;

    let result = service
        .create_appointment(patient_id, create_request(doctor_id), "test-token")
        .await;

    assert_matches!(
        result,
        Err(BookingError::Scheduling(SchedulingError::PatientDoubleBooked))
    );
}

#[tokio::test]
async fn test_create_appointment_no_availability_record() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    mock_no_conflicting_appointments(&mock_server, "doctor_id", doctor_id).await;
    mock_no_conflicting_appointments(&mock_server, "patient_id", patient_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = service
        .create_appointment(patient_id, create_request(doctor_id), "test-token")
        .await;

    assert_matches!(
        result,
        Err(BookingError::Scheduling(SchedulingError::UnavailableSlotRequested))
    );
}

#[tokio::test]
async fn test_create_appointment_slot_marked_booked() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    mock_no_conflicting_appointments(&mock_server, "doctor_id", doctor_id).await;
    mock_no_conflicting_appointments(&mock_server, "patient_id", patient_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "is_available": true,
                "slots": [
                    {
                        "start_time": "09:00",
                        "end_time": "09:30",
                        "status": "booked",
                        "appointment_id": Uuid::new_v4()
                    }
                ]
            }
        ])))
        .mount(&mock_server)
        .await;

    let result = service
        .create_appointment(patient_id, create_request(doctor_id), "test-token")
        .await;

    assert_matches!(
        result,
        Err(BookingError::Scheduling(SchedulingError::UnavailableSlotRequested))
    );
}

#[tokio::test]
async fn test_create_appointment_success() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_no_conflicting_appointments(&mock_server, "doctor_id", doctor_id).await;
    mock_no_conflicting_appointments(&mock_server, "patient_id", patient_id).await;
    mock_open_monday_slot(&mock_server, doctor_id).await;

    // Appointment-number query carries no owner filter.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param_is_missing("doctor_id"))
        .and(query_param_is_missing("patient_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id.to_string(),
                &doctor_id.to_string(),
                &patient_id.to_string(),
                "2030-01-07",
                "09:00",
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    let appointment = service
        .create_appointment(patient_id, create_request(doctor_id), "test-token")
        .await
        .unwrap();

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.appointment_time, "09:00");
    assert_eq!(appointment.appointment_number, "APT-000001");
}

#[tokio::test]
async fn test_create_appointment_commit_conflict_mapped() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    mock_no_conflicting_appointments(&mock_server, "doctor_id", doctor_id).await;
    mock_no_conflicting_appointments(&mock_server, "patient_id", patient_id).await;
    mock_open_monday_slot(&mock_server, doctor_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param_is_missing("doctor_id"))
        .and(query_param_is_missing("patient_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // Another booking won the race between pre-check and insert.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&mock_server)
        .await;

    let result = service
        .create_appointment(patient_id, create_request(doctor_id), "test-token")
        .await;

    assert_matches!(
        result,
        Err(BookingError::Scheduling(SchedulingError::DoctorDoubleBooked))
    );
}

#[tokio::test]
async fn test_create_appointment_requires_patient_role() {
    let mock_server = MockServer::start().await;
    let app = appointment_routes(Arc::new(test_config(&mock_server)));

    let doctor = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(
        &doctor,
        "test-secret-key-for-jwt-validation-must-be-long-enough",
        None,
    );

    let body = json!({
        "doctor_id": Uuid::new_v4(),
        "appointment_date": "2030-01-07",
        "appointment_time": "09:00",
        "appointment_type": "video",
        "chief_complaint": "General checkup"
    });

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cancel_appointment_sets_cancelled_status() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    let stored = MockSupabaseResponses::appointment_row(
        &appointment_id.to_string(),
        &doctor_id.to_string(),
        &patient.id,
        "2030-01-07",
        "09:00",
        "pending",
    );
    let mut cancelled = stored.clone();
    cancelled["status"] = json!("cancelled");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .mount(&mock_server)
        .await;

    let appointment = service
        .cancel_appointment(
            appointment_id,
            Some("schedule change".to_string()),
            &patient.to_user(),
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status.to_string(), "cancelled");
}

#[tokio::test]
async fn test_get_appointment_forbidden_for_stranger() {
    let mock_server = MockServer::start().await;
    let service = BookingService::new(&test_config(&mock_server));

    let stranger = TestUser::patient("stranger@example.com");
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                "2030-01-07",
                "09:00",
                "pending",
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = service
        .get_appointment(appointment_id, &stranger.to_user(), "test-token")
        .await;

    assert_matches!(result, Err(BookingError::Forbidden));
}
