use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{AvailabilityError, WeeklyAvailability, WeeklyAvailabilityEntry};
use crate::services::stores::ScheduleTemplateStore;

/// Manages the recurring weekly schedule. Templates are replaced wholesale:
/// a new set of weekday entries supersedes everything stored before.
pub struct WeeklyTemplateService {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl WeeklyTemplateService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            auth_token: auth_token.to_string(),
        }
    }

    /// Validates every entry up front, then clears the professional's
    /// previous template and inserts the new one.
    pub async fn replace_weekly_template(
        &self,
        professional_id: Uuid,
        entries: &[WeeklyAvailabilityEntry],
    ) -> Result<Vec<WeeklyAvailability>, AvailabilityError> {
        if entries.is_empty() {
            return Err(AvailabilityError::Validation(
                "template must contain at least one weekday entry".to_string(),
            ));
        }
        let mut seen = [false; 8];
        for entry in entries {
            entry.validate()?;
            let index = entry.day_of_week as usize;
            if seen[index] {
                return Err(AvailabilityError::Validation(format!(
                    "duplicate entry for day_of_week {}",
                    entry.day_of_week
                )));
            }
            seen[index] = true;
        }

        info!(
            "Replacing weekly template for professional {} with {} entries",
            professional_id,
            entries.len()
        );

        let delete_path = format!(
            "/rest/v1/weekly_availability?professional_id=eq.{}",
            professional_id
        );
        self.supabase
            .execute(Method::DELETE, &delete_path, Some(&self.auth_token), None)
            .await?;

        let rows: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "professional_id": professional_id,
                    "day_of_week": entry.day_of_week,
                    "work_start": entry.work_start,
                    "work_end": entry.work_end,
                    "break_start": entry.break_start,
                    "break_end": entry.break_end,
                    "attendance_type": entry.attendance_type,
                    "slot_duration_minutes": entry.slot_duration_minutes,
                    "active": true,
                })
            })
            .collect();

        let mut inserted: Vec<WeeklyAvailability> = self
            .supabase
            .insert(
                "/rest/v1/weekly_availability",
                Some(&self.auth_token),
                Value::Array(rows),
            )
            .await?;

        inserted.sort_by_key(|row| row.day_of_week);
        Ok(inserted)
    }

    /// The professional's active template, ordered Monday to Sunday.
    pub async fn get_weekly_template(
        &self,
        professional_id: Uuid,
    ) -> Result<Vec<WeeklyAvailability>, AvailabilityError> {
        let path = format!(
            "/rest/v1/weekly_availability?professional_id=eq.{}&active=eq.true&order=day_of_week.asc",
            professional_id
        );

        let rows: Vec<WeeklyAvailability> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ScheduleTemplateStore for WeeklyTemplateService {
    async fn get_weekly_availability(
        &self,
        professional_id: Uuid,
        day_of_week: u8,
    ) -> Result<Option<WeeklyAvailability>, AvailabilityError> {
        if !(1..=7).contains(&day_of_week) {
            return Err(AvailabilityError::Validation(format!(
                "day_of_week must be between 1 and 7, got {}",
                day_of_week
            )));
        }

        let path = format!(
            "/rest/v1/weekly_availability?professional_id=eq.{}&day_of_week=eq.{}&active=eq.true&limit=1",
            professional_id, day_of_week
        );

        let rows: Vec<WeeklyAvailability> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await?;
        Ok(rows.into_iter().next())
    }
}
