use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::json;
use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{AvailabilityError, CreateExceptionRequest, ScheduleException};
use crate::services::stores::ExceptionStore;

/// Manages dated schedule overrides: holidays, custom hours and blocks.
/// Exceptions are soft-deleted by clearing `active`, so history survives.
pub struct ExceptionService {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

#[derive(Debug, serde::Deserialize)]
struct ExceptionIdRow {
    id: Uuid,
}

impl ExceptionService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            auth_token: auth_token.to_string(),
        }
    }

    /// Creates an exception after checking that no active one already
    /// covers any of the same dates for the same scope.
    pub async fn create_exception(
        &self,
        request: &CreateExceptionRequest,
    ) -> Result<ScheduleException, AvailabilityError> {
        request.validate()?;
        let end_date = request.end_date.unwrap_or(request.start_date);

        let scope = match request.professional_id {
            Some(id) => format!("professional_id=eq.{}", id),
            None => "professional_id=is.null".to_string(),
        };
        let check_path = format!(
            "/rest/v1/schedule_exceptions?{}&active=eq.true&start_date=lte.{}&end_date=gte.{}&select=id&limit=1",
            scope,
            end_date.format("%Y-%m-%d"),
            request.start_date.format("%Y-%m-%d")
        );
        let existing: Vec<ExceptionIdRow> = self
            .supabase
            .request(Method::GET, &check_path, Some(&self.auth_token), None)
            .await?;
        if let Some(row) = existing.first() {
            return Err(AvailabilityError::Conflict(format!(
                "active exception {} already covers dates between {} and {}",
                row.id, request.start_date, end_date
            )));
        }

        let body = json!({
            "professional_id": request.professional_id,
            "start_date": request.start_date,
            "end_date": end_date,
            "start_time": request.start_time,
            "end_time": request.end_time,
            "kind": request.kind,
            "reason": request.reason,
            "active": true,
        });

        let inserted: Vec<ScheduleException> = self
            .supabase
            .insert("/rest/v1/schedule_exceptions", Some(&self.auth_token), body)
            .await
            .map_err(|e| match e {
                DbError::Conflict(message) => AvailabilityError::Conflict(message),
                other => other.into(),
            })?;

        let exception = inserted.into_iter().next().ok_or_else(|| {
            AvailabilityError::Database("exception insert returned no row".to_string())
        })?;

        info!(
            "Created {} exception {} covering {} to {}",
            exception.kind, exception.id, exception.start_date, exception.end_date
        );
        Ok(exception)
    }

    /// Soft-deletes an exception. Dates it covered immediately fall back to
    /// the weekly template.
    pub async fn deactivate_exception(
        &self,
        exception_id: Uuid,
    ) -> Result<ScheduleException, AvailabilityError> {
        let path = format!(
            "/rest/v1/schedule_exceptions?id=eq.{}&active=eq.true",
            exception_id
        );
        let updated: Vec<ScheduleException> = self
            .supabase
            .update(&path, Some(&self.auth_token), json!({"active": false}))
            .await?;

        updated.into_iter().next().ok_or_else(|| {
            AvailabilityError::NotFound(format!("no active exception with id {}", exception_id))
        })
    }

    /// Active exceptions visible to a professional: their own plus
    /// clinic-wide ones, optionally clipped to a date range.
    pub async fn list_exceptions(
        &self,
        professional_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ScheduleException>, AvailabilityError> {
        let mut path = format!(
            "/rest/v1/schedule_exceptions?or=(professional_id.eq.{},professional_id.is.null)&active=eq.true",
            professional_id
        );
        if let Some(from) = from {
            path.push_str(&format!("&end_date=gte.{}", from.format("%Y-%m-%d")));
        }
        if let Some(to) = to {
            path.push_str(&format!("&start_date=lte.{}", to.format("%Y-%m-%d")));
        }
        path.push_str("&order=start_date.asc");

        let rows: Vec<ScheduleException> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ExceptionStore for ExceptionService {
    async fn get_active_exception(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<ScheduleException>, AvailabilityError> {
        let date = date.format("%Y-%m-%d");
        // nullslast makes the professional's own exception win over a
        // clinic-wide one covering the same date
        let path = format!(
            "/rest/v1/schedule_exceptions?or=(professional_id.eq.{},professional_id.is.null)&active=eq.true&start_date=lte.{}&end_date=gte.{}&order=professional_id.nullslast&limit=1",
            professional_id, date, date
        );

        let rows: Vec<ScheduleException> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await?;
        Ok(rows.into_iter().next())
    }
}
