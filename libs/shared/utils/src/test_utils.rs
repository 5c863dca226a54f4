use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub calendar_api_base_url: String,
    pub calendar_api_token: String,
    pub clinic_calendar_id: String,
    pub clinic_timezone: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            calendar_api_base_url: "http://localhost:54322".to_string(),
            calendar_api_token: "test-calendar-token".to_string(),
            clinic_calendar_id: "clinic-test-calendar".to_string(),
            clinic_timezone: "America/Sao_Paulo".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            calendar_api_base_url: self.calendar_api_base_url.clone(),
            calendar_api_token: self.calendar_api_token.clone(),
            clinic_calendar_id: self.clinic_calendar_id.clone(),
            calendar_timeout_seconds: 5,
            clinic_timezone: self.clinic_timezone.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn professional(email: &str) -> Self {
        Self::new(email, "professional")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for wiremock-backed tests across the scheduling
/// cells.
pub struct MockSchedulingData;

impl MockSchedulingData {
    /// One active weekly template row: Mon-Fri shape, 09:00-18:00 with a
    /// 12:00-13:00 break and 60 minute slots.
    pub fn weekly_availability_row(professional_id: &str, day_of_week: u8) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "professional_id": professional_id,
            "day_of_week": day_of_week,
            "work_start": "09:00:00",
            "work_end": "18:00:00",
            "break_start": "12:00:00",
            "break_end": "13:00:00",
            "attendance_type": "hybrid",
            "slot_duration_minutes": 60,
            "active": true
        })
    }

    pub fn weekly_availability_row_no_break(
        professional_id: &str,
        day_of_week: u8,
        work_start: &str,
        work_end: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "professional_id": professional_id,
            "day_of_week": day_of_week,
            "work_start": work_start,
            "work_end": work_end,
            "break_start": null,
            "break_end": null,
            "attendance_type": "hybrid",
            "slot_duration_minutes": 60,
            "active": true
        })
    }

    pub fn exception_row(
        professional_id: Option<&str>,
        date: &str,
        kind: &str,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "professional_id": professional_id,
            "start_date": date,
            "end_date": date,
            "start_time": start_time,
            "end_time": end_time,
            "kind": kind,
            "reason": "test exception",
            "active": true
        })
    }

    pub fn appointment_row(
        professional_id: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "client_id": Uuid::new_v4(),
            "professional_id": professional_id,
            "date": date,
            "start_time": start_time,
            "end_time": end_time,
            "attendance_type": "in_person",
            "status": status,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    /// Free/busy response in the shape the calendar adapter consumes.
    pub fn free_busy_response(busy: &[(&str, &str)]) -> Value {
        let windows: Vec<Value> = busy
            .iter()
            .map(|(start, end)| json!({"start": start, "end": end}))
            .collect();
        json!({ "busy": windows })
    }
}
