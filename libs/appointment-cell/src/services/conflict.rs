use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use availability_cell::{ExceptionService, ExceptionStore};
use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::scheduling::intervals_conflict;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest};

#[derive(Debug, Deserialize)]
struct BookedSlotRow {
    id: Uuid,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

/// Guards the booking write path. The pre-insert check gives good error
/// messages; the store's exclusion constraint remains the final arbiter,
/// so two racing requests can never both land.
pub struct BookingConflictGuard {
    supabase: Arc<SupabaseClient>,
    exceptions: ExceptionService,
    auth_token: String,
}

impl BookingConflictGuard {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            exceptions: ExceptionService::new(config, auth_token),
            auth_token: auth_token.to_string(),
        }
    }

    /// Inserts the appointment only if its interval is free. A transient
    /// serialization failure earns exactly one retry of the whole
    /// check-then-insert sequence.
    pub async fn insert_appointment_if_free(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut retried = false;
        loop {
            if let Some(reason) = self
                .find_conflict(
                    request.professional_id,
                    request.date,
                    request.start_time,
                    request.end_time,
                    None,
                )
                .await?
            {
                return Err(AppointmentError::Conflict(reason));
            }

            match self.insert_row(request).await {
                Ok(appointment) => {
                    debug!(
                        "Appointment {} claimed {} {}-{}",
                        appointment.id, appointment.date, appointment.start_time, appointment.end_time
                    );
                    return Ok(appointment);
                }
                Err(DbError::Conflict(message)) => {
                    warn!(
                        "Constraint rejected booking for professional {} on {}: {}",
                        request.professional_id, request.date, message
                    );
                    return Err(AppointmentError::Conflict(
                        "the requested time was just booked".to_string(),
                    ));
                }
                Err(DbError::Serialization(message)) if !retried => {
                    warn!(
                        "Transient serialization failure while booking, retrying once: {}",
                        message
                    );
                    retried = true;
                }
                Err(other) => return Err(AppointmentError::Database(other.to_string())),
            }
        }
    }

    /// Moves an existing appointment to a new interval, excluding its own
    /// row from the conflict check. Sets the status back to scheduled.
    pub async fn move_appointment_if_free(
        &self,
        appointment: &Appointment,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Appointment, AppointmentError> {
        let mut retried = false;
        loop {
            if let Some(reason) = self
                .find_conflict(
                    appointment.professional_id,
                    date,
                    start_time,
                    end_time,
                    Some(appointment.id),
                )
                .await?
            {
                return Err(AppointmentError::Conflict(reason));
            }

            let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
            let body = json!({
                "date": date,
                "start_time": start_time,
                "end_time": end_time,
                "status": AppointmentStatus::Scheduled,
                "updated_at": Utc::now(),
            });

            match self
                .supabase
                .update::<Vec<Appointment>>(&path, Some(&self.auth_token), body)
                .await
            {
                Ok(updated) => {
                    return updated.into_iter().next().ok_or_else(|| {
                        AppointmentError::NotFound(format!(
                            "appointment {} not found",
                            appointment.id
                        ))
                    });
                }
                Err(DbError::Conflict(message)) => {
                    warn!(
                        "Constraint rejected reschedule of appointment {}: {}",
                        appointment.id, message
                    );
                    return Err(AppointmentError::Conflict(
                        "the requested time was just booked".to_string(),
                    ));
                }
                Err(DbError::Serialization(message)) if !retried => {
                    warn!(
                        "Transient serialization failure while rescheduling, retrying once: {}",
                        message
                    );
                    retried = true;
                }
                Err(other) => return Err(AppointmentError::Database(other.to_string())),
            }
        }
    }

    /// The first reason the interval cannot be booked: an overlapping
    /// active appointment, or a holiday/block exception covering it.
    async fn find_conflict(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Option<String>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?professional_id=eq.{}&date=eq.{}&status=in.(scheduled,confirmed)&select=id,start_time,end_time",
            professional_id,
            date.format("%Y-%m-%d")
        );
        if let Some(exclude_id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }

        let booked: Vec<BookedSlotRow> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        for row in &booked {
            if intervals_conflict(start_time, end_time, row.start_time, row.end_time) {
                return Ok(Some(format!(
                    "the requested time overlaps appointment {}",
                    row.id
                )));
            }
        }

        let exception = self
            .exceptions
            .get_active_exception(professional_id, date)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;
        if let Some(exception) = exception {
            if exception.blocks(start_time, end_time) {
                return Ok(Some(format!(
                    "{} is unavailable: {} exception {}",
                    date, exception.kind, exception.id
                )));
            }
        }

        Ok(None)
    }

    async fn insert_row(&self, request: &CreateAppointmentRequest) -> Result<Appointment, DbError> {
        let body = json!({
            "client_id": request.client_id,
            "professional_id": request.professional_id,
            "date": request.date,
            "start_time": request.start_time,
            "end_time": request.end_time,
            "attendance_type": request.attendance_type,
            "status": AppointmentStatus::Scheduled,
            "notes": request.notes,
        });

        let inserted: Vec<Appointment> = self
            .supabase
            .insert("/rest/v1/appointments", Some(&self.auth_token), body)
            .await?;

        inserted.into_iter().next().ok_or(DbError::Api {
            status: 500,
            message: "insert returned no row".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};
    use shared_models::scheduling::AttendanceType;
    use shared_utils::test_utils::{MockSchedulingData, TestConfig};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROFESSIONAL_ID: &str = "7c29e3c0-5db3-4a47-b1a7-2f1b27d1a111";

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn request(start: NaiveTime, end: NaiveTime) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            client_id: Uuid::new_v4(),
            professional_id: PROFESSIONAL_ID.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
            start_time: start,
            end_time: end,
            attendance_type: AttendanceType::InPerson,
            notes: None,
        }
    }

    async fn guard_against(server: &MockServer) -> BookingConflictGuard {
        let config = TestConfig {
            supabase_url: server.uri(),
            ..Default::default()
        };
        BookingConflictGuard::new(&config.to_app_config(), "test-token")
    }

    async fn mock_booked(server: &MockServer, rows: Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(server)
            .await;
    }

    async fn mock_exceptions(server: &MockServer, rows: Value) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/schedule_exceptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(server)
            .await;
    }

    fn inserted_row() -> Value {
        MockSchedulingData::appointment_row(
            PROFESSIONAL_ID,
            "2025-07-14",
            "10:00:00",
            "11:00:00",
            "scheduled",
        )
    }

    #[tokio::test]
    async fn test_overlap_is_rejected_before_insert() {
        let server = MockServer::start().await;
        mock_booked(
            &server,
            json!([{"id": Uuid::new_v4(), "start_time": "10:00:00", "end_time": "11:00:00"}]),
        )
        .await;
        mock_exceptions(&server, json!([])).await;

        let guard = guard_against(&server).await;
        let result = guard
            .insert_appointment_if_free(&request(time(10, 30), time(11, 30)))
            .await;

        assert_matches!(result, Err(AppointmentError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_back_to_back_is_not_a_conflict() {
        let server = MockServer::start().await;
        mock_booked(
            &server,
            json!([{"id": Uuid::new_v4(), "start_time": "09:00:00", "end_time": "10:00:00"}]),
        )
        .await;
        mock_exceptions(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([inserted_row()])))
            .mount(&server)
            .await;

        let guard = guard_against(&server).await;
        let result = guard
            .insert_appointment_if_free(&request(time(10, 0), time(11, 0)))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_blocking_exception_rejects_booking() {
        let server = MockServer::start().await;
        mock_booked(&server, json!([])).await;
        mock_exceptions(
            &server,
            json!([MockSchedulingData::exception_row(
                Some(PROFESSIONAL_ID),
                "2025-07-14",
                "block",
                None,
                None
            )]),
        )
        .await;

        let guard = guard_against(&server).await;
        let result = guard
            .insert_appointment_if_free(&request(time(10, 0), time(11, 0)))
            .await;

        assert_matches!(result, Err(AppointmentError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_constraint_race_maps_to_conflict() {
        let server = MockServer::start().await;
        mock_booked(&server, json!([])).await;
        mock_exceptions(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23P01",
                "message": "conflicting key value violates exclusion constraint"
            })))
            .mount(&server)
            .await;

        let guard = guard_against(&server).await;
        let result = guard
            .insert_appointment_if_free(&request(time(10, 0), time(11, 0)))
            .await;

        assert_matches!(result, Err(AppointmentError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_serialization_failure_is_retried_once() {
        let server = MockServer::start().await;
        mock_booked(&server, json!([])).await;
        mock_exceptions(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "code": "40001",
                "message": "could not serialize access due to concurrent update"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([inserted_row()])))
            .mount(&server)
            .await;

        let guard = guard_against(&server).await;
        let result = guard
            .insert_appointment_if_free(&request(time(10, 0), time(11, 0)))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_persistent_serialization_failure_gives_up() {
        let server = MockServer::start().await;
        mock_booked(&server, json!([])).await;
        mock_exceptions(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "code": "40001",
                "message": "could not serialize access due to concurrent update"
            })))
            .mount(&server)
            .await;

        let guard = guard_against(&server).await;
        let result = guard
            .insert_appointment_if_free(&request(time(10, 0), time(11, 0)))
            .await;

        assert_matches!(result, Err(AppointmentError::Database(_)));
    }

    #[tokio::test]
    async fn test_concurrent_claims_let_exactly_one_through() {
        let server = MockServer::start().await;
        mock_booked(&server, json!([])).await;
        mock_exceptions(&server, json!([])).await;
        // the store accepts the first insert and rejects the second
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([inserted_row()])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23P01",
                "message": "conflicting key value violates exclusion constraint"
            })))
            .mount(&server)
            .await;

        let guard = guard_against(&server).await;
        let booking = request(time(10, 0), time(11, 0));
        let (first, second) = tokio::join!(
            guard.insert_appointment_if_free(&booking),
            guard.insert_appointment_if_free(&booking),
        );

        assert!(first.is_ok() != second.is_ok());
        let loser = if first.is_ok() { second } else { first };
        assert_matches!(loser, Err(AppointmentError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reschedule_excludes_own_row() {
        let server = MockServer::start().await;
        let own_id = Uuid::new_v4();
        // only answer a lookup that excludes the row being moved
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("neq.{}", own_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        mock_exceptions(&server, json!([])).await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([inserted_row()])))
            .mount(&server)
            .await;

        let guard = guard_against(&server).await;
        let appointment = Appointment {
            id: own_id,
            client_id: Uuid::new_v4(),
            professional_id: PROFESSIONAL_ID.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
            start_time: time(9, 0),
            end_time: time(10, 0),
            attendance_type: AttendanceType::InPerson,
            status: AppointmentStatus::Cancelled,
            notes: None,
            created_at: None,
            updated_at: None,
        };
        let result = guard
            .move_appointment_if_free(
                &appointment,
                NaiveDate::from_ymd_opt(2025, 7, 14).unwrap(),
                time(10, 0),
                time(11, 0),
            )
            .await;

        assert!(result.is_ok());
    }
}
