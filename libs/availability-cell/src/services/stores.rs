use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde::Deserialize;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::scheduling::{BusyInterval, BusySource};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AvailabilityError, ScheduleException, WeeklyAvailability};

/// Read access to the recurring weekly schedule.
#[async_trait]
pub trait ScheduleTemplateStore: Send + Sync {
    /// The active template row for one weekday (1 = Monday .. 7 = Sunday),
    /// or `None` when the professional has no schedule for that day.
    async fn get_weekly_availability(
        &self,
        professional_id: Uuid,
        day_of_week: u8,
    ) -> Result<Option<WeeklyAvailability>, AvailabilityError>;
}

/// Read access to dated schedule overrides.
#[async_trait]
pub trait ExceptionStore: Send + Sync {
    /// The active exception covering a date, if any. Professional-specific
    /// exceptions win over clinic-wide ones.
    async fn get_active_exception(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<ScheduleException>, AvailabilityError>;
}

/// Read access to booked time.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Busy intervals from appointments still holding their time on the
    /// given date (scheduled or confirmed).
    async fn get_active_appointments(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BusyInterval>, AvailabilityError>;
}

#[derive(Debug, Deserialize)]
struct AppointmentTimeRow {
    start_time: NaiveTime,
    end_time: NaiveTime,
}

/// Booking reads backed by the appointments table. Only fetches the two
/// time columns the slot pipeline needs.
pub struct SupabaseBookingStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseBookingStore {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            auth_token: auth_token.to_string(),
        }
    }
}

#[async_trait]
impl BookingStore for SupabaseBookingStore {
    async fn get_active_appointments(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BusyInterval>, AvailabilityError> {
        let path = format!(
            "/rest/v1/appointments?professional_id=eq.{}&date=eq.{}&status=in.(scheduled,confirmed)&select=start_time,end_time",
            professional_id,
            date.format("%Y-%m-%d")
        );

        let rows: Vec<AppointmentTimeRow> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| BusyInterval::new(row.start_time, row.end_time, BusySource::Booking))
            .collect())
    }
}
