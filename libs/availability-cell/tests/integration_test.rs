use availability_cell::router::availability_routes;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_utils::test_utils::{JwtTestUtils, MockSchedulingData, TestConfig, TestUser};

const PROFESSIONAL_ID: &str = "7c29e3c0-5db3-4a47-b1a7-2f1b27d1a111";

struct TestApp {
    app: Router,
    supabase: MockServer,
    calendar: MockServer,
    jwt_secret: String,
}

async fn setup() -> TestApp {
    let supabase = MockServer::start().await;
    let calendar = MockServer::start().await;
    let config = TestConfig {
        supabase_url: supabase.uri(),
        calendar_api_base_url: calendar.uri(),
        ..Default::default()
    };
    let jwt_secret = config.jwt_secret.clone();
    let app = availability_routes(config.to_arc());
    TestApp {
        app,
        supabase,
        calendar,
        jwt_secret,
    }
}

impl TestApp {
    fn token_for(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.jwt_secret, None)
    }

    async fn mock_weekly_template(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/weekly_availability"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSchedulingData::weekly_availability_row(PROFESSIONAL_ID, 1)
            ])))
            .mount(&self.supabase)
            .await;
    }

    async fn mock_no_exceptions(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/schedule_exceptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&self.supabase)
            .await;
    }

    async fn mock_appointments(&self, rows: Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.supabase)
            .await;
    }

    async fn mock_free_calendar(&self) {
        Mock::given(method("POST"))
            .and(path("/freeBusy"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(MockSchedulingData::free_busy_response(&[])),
            )
            .mount(&self.calendar)
            .await;
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn json_request(http_method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(http_method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_search_returns_requested_slots() {
    let test_app = setup().await;
    test_app.mock_weekly_template().await;
    test_app.mock_no_exceptions().await;
    test_app.mock_appointments(json!([])).await;
    test_app.mock_free_calendar().await;

    let token = test_app.token_for(&TestUser::patient("booker@example.com"));
    let uri = format!(
        "/search?professional_id={}&start=2025-07-14T08:00:00-03:00&count=3",
        PROFESSIONAL_ID
    );
    let (status, body) = test_app.send(get(&uri, &token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["count"], json!(3));
    let slots = body["slots"].as_array().unwrap();
    assert!(slots[0]["start"].as_str().unwrap().contains("09:00:00"));
    assert!(slots[1]["start"].as_str().unwrap().contains("10:00:00"));
    assert!(slots[2]["start"].as_str().unwrap().contains("11:00:00"));
}

#[tokio::test]
async fn test_search_skips_booked_time() {
    let test_app = setup().await;
    test_app.mock_weekly_template().await;
    test_app.mock_no_exceptions().await;
    test_app
        .mock_appointments(json!([MockSchedulingData::appointment_row(
            PROFESSIONAL_ID,
            "2025-07-14",
            "10:00:00",
            "11:00:00",
            "scheduled"
        )]))
        .await;
    test_app.mock_free_calendar().await;

    let token = test_app.token_for(&TestUser::patient("booker@example.com"));
    let uri = format!(
        "/search?professional_id={}&start=2025-07-14T08:00:00-03:00&count=3",
        PROFESSIONAL_ID
    );
    let (status, body) = test_app.send(get(&uri, &token)).await;

    assert_eq!(status, StatusCode::OK);
    let slots = body["slots"].as_array().unwrap();
    assert!(slots[0]["start"].as_str().unwrap().contains("09:00:00"));
    assert!(slots[1]["start"].as_str().unwrap().contains("11:00:00"));
    assert!(slots[2]["start"].as_str().unwrap().contains("13:00:00"));
}

#[tokio::test]
async fn test_search_survives_calendar_outage() {
    let test_app = setup().await;
    test_app.mock_weekly_template().await;
    test_app.mock_no_exceptions().await;
    test_app.mock_appointments(json!([])).await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&test_app.calendar)
        .await;

    let token = test_app.token_for(&TestUser::patient("booker@example.com"));
    let uri = format!(
        "/search?professional_id={}&start=2025-07-14T08:00:00-03:00&count=3",
        PROFESSIONAL_ID
    );
    let (status, body) = test_app.send(get(&uri, &token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(3));
}

#[tokio::test]
async fn test_search_rejects_bad_count() {
    let test_app = setup().await;
    let token = test_app.token_for(&TestUser::patient("booker@example.com"));
    let uri = format!("/search?professional_id={}&count=0", PROFESSIONAL_ID);
    let (status, body) = test_app.send(get(&uri, &token)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("count"));
}

#[tokio::test]
async fn test_search_requires_token() {
    let test_app = setup().await;
    let uri = format!("/search?professional_id={}", PROFESSIONAL_ID);
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let (status, _) = test_app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_day_slots_reflect_template_break() {
    let test_app = setup().await;
    test_app.mock_weekly_template().await;
    test_app.mock_no_exceptions().await;
    test_app.mock_appointments(json!([])).await;
    test_app.mock_free_calendar().await;

    let token = test_app.token_for(&TestUser::patient("booker@example.com"));
    let uri = format!("/day/{}/2025-07-14", PROFESSIONAL_ID);
    let (status, body) = test_app.send(get(&uri, &token)).await;

    assert_eq!(status, StatusCode::OK);
    // 09:00-18:00 with a 12:00-13:00 break fits eight hour-long slots
    assert_eq!(body["count"], json!(8));
    let slots = body["slots"].as_array().unwrap();
    assert!(slots.iter().all(|slot| {
        let start = slot["start"].as_str().unwrap();
        !start.contains("12:00:00")
    }));
}

#[tokio::test]
async fn test_replace_template_rejects_bad_weekday() {
    let test_app = setup().await;
    let token = test_app.token_for(&TestUser::admin("admin@example.com"));
    let body = json!({
        "entries": [{
            "day_of_week": 9,
            "work_start": "09:00:00",
            "work_end": "18:00:00",
            "attendance_type": "hybrid"
        }]
    });
    let uri = format!("/template/{}", PROFESSIONAL_ID);
    let (status, response) = test_app
        .send(json_request("PUT", &uri, &token, body))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("day_of_week"));
}

#[tokio::test]
async fn test_replace_template_requires_schedule_manager() {
    let test_app = setup().await;
    let token = test_app.token_for(&TestUser::patient("sneaky@example.com"));
    let body = json!({
        "entries": [{
            "day_of_week": 1,
            "work_start": "09:00:00",
            "work_end": "18:00:00",
            "attendance_type": "hybrid"
        }]
    });
    let uri = format!("/template/{}", PROFESSIONAL_ID);
    let (status, _) = test_app
        .send(json_request("PUT", &uri, &token, body))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_replace_template_stores_new_entries() {
    let test_app = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/weekly_availability"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&test_app.supabase)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_availability"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSchedulingData::weekly_availability_row(PROFESSIONAL_ID, 1)
        ])))
        .mount(&test_app.supabase)
        .await;

    let token = test_app.token_for(&TestUser::admin("admin@example.com"));
    let body = json!({
        "entries": [{
            "day_of_week": 1,
            "work_start": "09:00:00",
            "work_end": "18:00:00",
            "break_start": "12:00:00",
            "break_end": "13:00:00",
            "attendance_type": "hybrid",
            "slot_duration_minutes": 60
        }]
    });
    let uri = format!("/template/{}", PROFESSIONAL_ID);
    let (status, response) = test_app
        .send(json_request("PUT", &uri, &token, body))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["template"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_exception_rejects_overlap() {
    let test_app = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_exceptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSchedulingData::exception_row(None, "2025-12-25", "holiday", None, None)
        ])))
        .mount(&test_app.supabase)
        .await;

    let token = test_app.token_for(&TestUser::admin("admin@example.com"));
    let body = json!({
        "start_date": "2025-12-25",
        "kind": "holiday"
    });
    let (status, response) = test_app
        .send(json_request("POST", "/exceptions", &token, body))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(response["error"].as_str().unwrap().contains("exception"));
}

#[tokio::test]
async fn test_create_exception_succeeds() {
    let test_app = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_exceptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&test_app.supabase)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_exceptions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSchedulingData::exception_row(None, "2025-12-25", "holiday", None, None)
        ])))
        .mount(&test_app.supabase)
        .await;

    let token = test_app.token_for(&TestUser::admin("admin@example.com"));
    let body = json!({
        "start_date": "2025-12-25",
        "kind": "holiday"
    });
    let (status, response) = test_app
        .send(json_request("POST", "/exceptions", &token, body))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["exception"]["kind"], json!("holiday"));
}

#[tokio::test]
async fn test_clinic_wide_exception_requires_admin() {
    let test_app = setup().await;
    let token = test_app.token_for(&TestUser::professional("pro@example.com"));
    let body = json!({
        "start_date": "2025-12-25",
        "kind": "holiday"
    });
    let (status, _) = test_app
        .send(json_request("POST", "/exceptions", &token, body))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
