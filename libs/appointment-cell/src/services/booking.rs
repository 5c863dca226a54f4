use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, BookingValidationRules,
    CreateAppointmentRequest, RescheduleRequest,
};
use crate::services::conflict::BookingConflictGuard;
use crate::services::lifecycle::AppointmentLifecycleService;

/// Front door for appointment writes and reads. Policy checks run first,
/// then the conflict guard owns the actual claim on the time slot.
pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    guard: BookingConflictGuard,
    lifecycle: AppointmentLifecycleService,
    rules: BookingValidationRules,
    timezone: Tz,
    auth_token: String,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Result<Self, AppointmentError> {
        let timezone = config.clinic_timezone.parse::<Tz>().map_err(|_| {
            AppointmentError::Configuration(format!(
                "Unknown clinic timezone: {}",
                config.clinic_timezone
            ))
        })?;

        Ok(Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            guard: BookingConflictGuard::new(config, auth_token),
            lifecycle: AppointmentLifecycleService::new(),
            rules: BookingValidationRules::default(),
            timezone,
            auth_token: auth_token.to_string(),
        })
    }

    pub async fn book_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now().with_timezone(&self.timezone).naive_local();
        self.rules.validate(request, now)?;

        info!(
            "Booking appointment for client {} with professional {} on {} {}-{}",
            request.client_id,
            request.professional_id,
            request.date,
            request.start_time,
            request.end_time
        );

        self.guard.insert_appointment_if_free(request).await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        rows.into_iter().next().ok_or_else(|| {
            AppointmentError::NotFound(format!("appointment {} not found", appointment_id))
        })
    }

    pub async fn search_appointments(
        &self,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filters = Vec::new();
        if let Some(professional_id) = query.professional_id {
            filters.push(format!("professional_id=eq.{}", professional_id));
        }
        if let Some(client_id) = query.client_id {
            filters.push(format!("client_id=eq.{}", client_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.from {
            filters.push(format!("date=gte.{}", from.format("%Y-%m-%d")));
        }
        if let Some(to) = query.to {
            filters.push(format!("date=lte.{}", to.format("%Y-%m-%d")));
        }
        filters.push("order=date.asc,start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", filters.join("&"));
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;
        Ok(rows)
    }

    /// Status change through the lifecycle state machine. Returning to
    /// scheduled is reserved for the reschedule path, which re-checks
    /// conflicts before reviving the appointment.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        if new_status == AppointmentStatus::Scheduled {
            return Err(AppointmentError::Validation(
                "an appointment returns to scheduled only through rescheduling".to_string(),
            ));
        }

        let appointment = self.get_appointment(appointment_id).await?;
        self.lifecycle
            .validate_transition(appointment.status, new_status)?;

        info!(
            "Appointment {} status {} -> {}",
            appointment_id, appointment.status, new_status
        );

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({
            "status": new_status,
            "updated_at": Utc::now(),
        });
        let updated: Vec<Appointment> = self
            .supabase
            .update(&path, Some(&self.auth_token), body)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        updated.into_iter().next().ok_or_else(|| {
            AppointmentError::NotFound(format!("appointment {} not found", appointment_id))
        })
    }

    /// Moves a cancelled appointment to a new interval and revives it as
    /// scheduled. The new interval passes the same policy and conflict
    /// checks as a fresh booking.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: &RescheduleRequest,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;
        self.lifecycle
            .validate_transition(appointment.status, AppointmentStatus::Scheduled)?;

        let candidate = CreateAppointmentRequest {
            client_id: appointment.client_id,
            professional_id: appointment.professional_id,
            date: request.date,
            start_time: request.start_time,
            end_time: request.end_time,
            attendance_type: appointment.attendance_type,
            notes: appointment.notes.clone(),
        };
        let now = Utc::now().with_timezone(&self.timezone).naive_local();
        self.rules.validate(&candidate, now)?;

        info!(
            "Rescheduling appointment {} to {} {}-{}",
            appointment_id, request.date, request.start_time, request.end_time
        );

        self.guard
            .move_appointment_if_free(&appointment, request.date, request.start_time, request.end_time)
            .await
    }

    /// Scheduled appointments awaiting the professional's confirmation,
    /// soonest first. Without an explicit date, looks from today onward.
    pub async fn pending_confirmations(
        &self,
        professional_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = String::from("/rest/v1/appointments?status=eq.scheduled");
        if let Some(professional_id) = professional_id {
            path.push_str(&format!("&professional_id=eq.{}", professional_id));
        }
        match date {
            Some(date) => path.push_str(&format!("&date=eq.{}", date.format("%Y-%m-%d"))),
            None => {
                let today = Utc::now().with_timezone(&self.timezone).date_naive();
                path.push_str(&format!("&date=gte.{}", today.format("%Y-%m-%d")));
            }
        }
        path.push_str("&order=date.asc,start_time.asc");

        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveTime;
    use serde_json::Value;
    use shared_models::scheduling::AttendanceType;
    use shared_utils::test_utils::{MockSchedulingData, TestConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROFESSIONAL_ID: &str = "7c29e3c0-5db3-4a47-b1a7-2f1b27d1a111";

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    async fn service_against(server: &MockServer) -> AppointmentBookingService {
        let config = TestConfig {
            supabase_url: server.uri(),
            ..Default::default()
        };
        AppointmentBookingService::new(&config.to_app_config(), "test-token").unwrap()
    }

    async fn mock_get_appointment(server: &MockServer, status: &str) -> Value {
        let row = MockSchedulingData::appointment_row(
            PROFESSIONAL_ID,
            "2030-01-10",
            "10:00:00",
            "11:00:00",
            status,
        );
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
            .mount(server)
            .await;
        row
    }

    #[tokio::test]
    async fn test_booking_rejects_invalid_request_without_touching_store() {
        let server = MockServer::start().await;
        let service = service_against(&server).await;

        let bad = CreateAppointmentRequest {
            client_id: Uuid::new_v4(),
            professional_id: PROFESSIONAL_ID.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(2030, 1, 10).unwrap(),
            start_time: time(11, 0),
            end_time: time(10, 0),
            attendance_type: AttendanceType::InPerson,
            notes: None,
        };
        let result = service.book_appointment(&bad).await;

        assert_matches!(result, Err(AppointmentError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_status_rejects_direct_scheduled() {
        let server = MockServer::start().await;
        let service = service_against(&server).await;

        let result = service
            .update_status(Uuid::new_v4(), AppointmentStatus::Scheduled)
            .await;

        assert_matches!(result, Err(AppointmentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_status_enforces_state_machine() {
        let server = MockServer::start().await;
        mock_get_appointment(&server, "completed").await;
        let service = service_against(&server).await;

        let result = service
            .update_status(Uuid::new_v4(), AppointmentStatus::Cancelled)
            .await;

        assert_matches!(
            result,
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[tokio::test]
    async fn test_update_status_confirms_scheduled_appointment() {
        let server = MockServer::start().await;
        let row = MockSchedulingData::appointment_row(
            PROFESSIONAL_ID,
            "2030-01-10",
            "10:00:00",
            "11:00:00",
            "scheduled",
        );
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
            .mount(&server)
            .await;
        let mut confirmed = row.clone();
        confirmed["status"] = json!("confirmed");
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([confirmed])))
            .mount(&server)
            .await;
        let service = service_against(&server).await;

        let updated = service
            .update_status(Uuid::new_v4(), AppointmentStatus::Confirmed)
            .await
            .unwrap();

        assert_eq!(updated.status, AppointmentStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_reschedule_requires_cancelled_status() {
        let server = MockServer::start().await;
        mock_get_appointment(&server, "scheduled").await;
        let service = service_against(&server).await;

        let result = service
            .reschedule_appointment(
                Uuid::new_v4(),
                &RescheduleRequest {
                    date: NaiveDate::from_ymd_opt(2030, 1, 12).unwrap(),
                    start_time: time(10, 0),
                    end_time: time(11, 0),
                },
            )
            .await;

        assert_matches!(
            result,
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[tokio::test]
    async fn test_get_appointment_maps_missing_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let service = service_against(&server).await;

        let result = service.get_appointment(Uuid::new_v4()).await;

        assert_matches!(result, Err(AppointmentError::NotFound(_)));
    }
}
