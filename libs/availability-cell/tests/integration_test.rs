use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::router::availability_routes;
use availability_cell::services::slots::{
    generate_slots, next_occurrence, DEFAULT_SLOT_DURATION_MINUTES,
};
use availability_cell::models::TimeRange;
use shared_config::AppConfig;
use shared_models::scheduling::DayOfWeek;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestUser};

fn test_config(mock_server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: mock_server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
    }
}

fn create_test_app(config: AppConfig) -> Router {
    availability_routes(Arc::new(config))
}

fn doctor_token(user: &TestUser) -> String {
    JwtTestUtils::create_test_token(
        user,
        "test-secret-key-for-jwt-validation-must-be-long-enough",
        None,
    )
}

fn two_slots_json() -> serde_json::Value {
    json!([
        {"start_time": "09:00", "end_time": "09:30", "status": "available", "appointment_id": null},
        {"start_time": "09:30", "end_time": "10:00", "status": "available", "appointment_id": null}
    ])
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_get_doctor_slots_public_filters_booked() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let doctor_id = Uuid::new_v4();
    // A fixed future Monday keeps the date-exact computation stable.
    let appointment_date = "2030-01-07";

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("day_of_week", "eq.monday"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "monday",
                two_slots_json(),
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("appointment_date", format!("eq.{}", appointment_date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": Uuid::new_v4(),
                "appointment_date": appointment_date,
                "appointment_time": "09:30",
                "status": "pending"
            }
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(&format!(
            "/doctor/{}?appointment_date={}",
            doctor_id, appointment_date
        ))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = read_json(response).await;
    assert_eq!(json_response["appointment_date"], appointment_date);

    let slots = json_response["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 1, "the booked slot is not offered");
    assert_eq!(slots[0]["start_time"], "09:00");
}

#[tokio::test]
async fn test_get_doctor_slots_public_no_record() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(&format!("/doctor/{}?appointment_date=2030-01-07", doctor_id))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = read_json(response).await;
    assert_eq!(json_response["slots"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_weekly_availability_requires_auth() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_weekly_availability_marks_booked_slot() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let user = TestUser::doctor("doctor@example.com");
    let token = doctor_token(&user);
    let appointment_id = Uuid::new_v4();

    // Booking on the upcoming Monday, whichever week that lands in.
    let target = next_occurrence(DayOfWeek::Monday, Utc::now().date_naive());

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                &Uuid::new_v4().to_string(),
                &user.id,
                "monday",
                two_slots_json(),
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(pending,confirmed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": appointment_id,
                "appointment_date": target.to_string(),
                "appointment_time": "09:30",
                "status": "confirmed"
            }
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = read_json(response).await;
    let days = json_response.as_array().unwrap();
    assert_eq!(days.len(), 1);

    let slots = days[0]["slots"].as_array().unwrap();
    assert_eq!(slots[1]["status"], "booked");
    assert_eq!(slots[1]["appointment_id"], appointment_id.to_string());
}

#[tokio::test]
async fn test_set_availability_creates_new_day() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let user = TestUser::doctor("doctor@example.com");
    let token = doctor_token(&user);

    let expected_slots = generate_slots(
        &[TimeRange {
            start_time: "09:00".to_string(),
            end_time: "13:00".to_string(),
        }],
        DEFAULT_SLOT_DURATION_MINUTES,
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                &Uuid::new_v4().to_string(),
                &user.id,
                "monday",
                serde_json::to_value(&expected_slots).unwrap(),
            )
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({
        "day_of_week": "monday",
        "time_ranges": [{"start_time": "09:00", "end_time": "13:00"}]
    });

    let request = Request::builder()
        .method("POST")
        .uri("/set")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = read_json(response).await;
    assert_eq!(json_response["day_of_week"], "monday");
    assert_eq!(json_response["slots"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_remove_booked_slot_rejected() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let user = TestUser::doctor("doctor@example.com");
    let token = doctor_token(&user);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                &Uuid::new_v4().to_string(),
                &user.id,
                "monday",
                json!([
                    {
                        "start_time": "09:00",
                        "end_time": "09:30",
                        "status": "booked",
                        "appointment_id": Uuid::new_v4()
                    }
                ]),
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/monday/remove-slot")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"start_time": "09:00"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json_response = read_json(response).await;
    assert!(json_response["error"]
        .as_str()
        .unwrap()
        .contains("cannot be removed"));
}

#[tokio::test]
async fn test_add_slot_unknown_day_not_found() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let user = TestUser::doctor("doctor@example.com");
    let token = doctor_token(&user);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/tuesday/add-slot")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"start_time": "09:00", "end_time": "10:00"}).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_availability_with_bookings_rejected() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let user = TestUser::doctor("doctor@example.com");
    let token = doctor_token(&user);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_row(
                &Uuid::new_v4().to_string(),
                &user.id,
                "monday",
                json!([
                    {
                        "start_time": "09:00",
                        "end_time": "09:30",
                        "status": "booked",
                        "appointment_id": Uuid::new_v4()
                    }
                ]),
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/monday")
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json_response = read_json(response).await;
    assert!(json_response["error"]
        .as_str()
        .unwrap()
        .contains("booked slot"));
}

#[tokio::test]
async fn test_invalid_day_in_path_rejected() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(test_config(&mock_server));

    let user = TestUser::doctor("doctor@example.com");
    let token = doctor_token(&user);

    let request = Request::builder()
        .method("POST")
        .uri("/someday/remove-slot")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({"start_time": "09:00"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
