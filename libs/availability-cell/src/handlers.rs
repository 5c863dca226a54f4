use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::scheduling::AttendanceType;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    AvailabilityError, CreateExceptionRequest, ReplaceWeeklyTemplateRequest,
    DEFAULT_DESIRED_COUNT, DEFAULT_HORIZON_DAYS,
};
use crate::services::exceptions::ExceptionService;
use crate::services::search::{AvailabilitySearchService, SlotSearchParams};
use crate::services::template::WeeklyTemplateService;

#[derive(Debug, Deserialize)]
pub struct SlotSearchQuery {
    pub professional_id: Uuid,
    /// RFC 3339 timestamp; defaults to now in the clinic timezone.
    #[serde(default)]
    pub start: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub attendance_type: Option<AttendanceType>,
    #[serde(default)]
    pub horizon_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DaySlotsQuery {
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub attendance_type: Option<AttendanceType>,
}

#[derive(Debug, Deserialize)]
pub struct ExceptionListQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

fn map_availability_error(err: AvailabilityError) -> AppError {
    match err {
        AvailabilityError::Validation(message) => AppError::ValidationError(message),
        AvailabilityError::NotFound(message) => AppError::NotFound(message),
        AvailabilityError::Conflict(message) => AppError::Conflict(message),
        AvailabilityError::Database(message) => AppError::Database(message),
        AvailabilityError::Configuration(message) => AppError::Internal(message),
    }
}

/// Admins manage any schedule; professionals only their own.
fn ensure_schedule_manager(user: &User, professional_id: Uuid) -> Result<(), AppError> {
    match user.role.as_deref() {
        Some("admin") => Ok(()),
        Some("professional") if user.id == professional_id.to_string() => Ok(()),
        _ => Err(AppError::Auth(
            "Only the professional or an admin can manage this schedule".to_string(),
        )),
    }
}

fn validate_duration(duration_minutes: Option<i32>) -> Result<(), AppError> {
    if let Some(duration) = duration_minutes {
        if !(1..=480).contains(&duration) {
            return Err(AppError::ValidationError(
                "duration_minutes must be between 1 and 480".to_string(),
            ));
        }
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn search_open_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<SlotSearchQuery>,
) -> Result<Json<Value>, AppError> {
    debug!(
        "Slot search for professional {} requested by user {}",
        query.professional_id, user.id
    );

    let desired_count = query.count.unwrap_or(DEFAULT_DESIRED_COUNT);
    if !(1..=50).contains(&desired_count) {
        return Err(AppError::ValidationError(
            "count must be between 1 and 50".to_string(),
        ));
    }
    let horizon_days = query.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS);
    if !(1..=365).contains(&horizon_days) {
        return Err(AppError::ValidationError(
            "horizon_days must be between 1 and 365".to_string(),
        ));
    }
    validate_duration(query.duration_minutes)?;

    let service = AvailabilitySearchService::new(&state, bearer.token())
        .map_err(map_availability_error)?;
    let timezone = service.timezone();
    let start = match query.start {
        Some(instant) => instant.with_timezone(&timezone),
        None => Utc::now().with_timezone(&timezone),
    };

    let params = SlotSearchParams {
        professional_id: query.professional_id,
        start,
        desired_count,
        slot_duration_minutes: query.duration_minutes,
        attendance_type: query.attendance_type.unwrap_or(AttendanceType::Hybrid),
        horizon_days,
    };

    let slots = service
        .find_open_slots(&params)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "professional_id": query.professional_id,
        "count": slots.len(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn get_day_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path((professional_id, date)): Path<(Uuid, NaiveDate)>,
    Query(query): Query<DaySlotsQuery>,
) -> Result<Json<Value>, AppError> {
    debug!(
        "Day slots for professional {} on {} requested by user {}",
        professional_id, date, user.id
    );
    validate_duration(query.duration_minutes)?;

    let service = AvailabilitySearchService::new(&state, bearer.token())
        .map_err(map_availability_error)?;
    let slots = service
        .day_slots(professional_id, date, query.duration_minutes, query.attendance_type)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "professional_id": professional_id,
        "date": date,
        "count": slots.len(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn replace_weekly_template(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(professional_id): Path<Uuid>,
    Json(request): Json<ReplaceWeeklyTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_schedule_manager(&user, professional_id)?;
    info!(
        "User {} replacing weekly template for professional {}",
        user.id, professional_id
    );

    let service = WeeklyTemplateService::new(&state, bearer.token());
    let template = service
        .replace_weekly_template(professional_id, &request.entries)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "professional_id": professional_id,
        "template": template,
    })))
}

#[axum::debug_handler]
pub async fn get_weekly_template(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Path(professional_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = WeeklyTemplateService::new(&state, bearer.token());
    let template = service
        .get_weekly_template(professional_id)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "professional_id": professional_id,
        "template": template,
    })))
}

#[axum::debug_handler]
pub async fn create_exception(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateExceptionRequest>,
) -> Result<Json<Value>, AppError> {
    match request.professional_id {
        Some(professional_id) => ensure_schedule_manager(&user, professional_id)?,
        None => {
            if user.role.as_deref() != Some("admin") {
                return Err(AppError::Auth(
                    "Only admins can create clinic-wide exceptions".to_string(),
                ));
            }
        }
    }

    let service = ExceptionService::new(&state, bearer.token());
    let exception = service
        .create_exception(&request)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "exception": exception,
    })))
}

#[axum::debug_handler]
pub async fn deactivate_exception(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(exception_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    match user.role.as_deref() {
        Some("admin") | Some("professional") => {}
        _ => {
            return Err(AppError::Auth(
                "Only professionals and admins can remove exceptions".to_string(),
            ));
        }
    }
    info!("User {} deactivating exception {}", user.id, exception_id);

    let service = ExceptionService::new(&state, bearer.token());
    let exception = service
        .deactivate_exception(exception_id)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "exception": exception,
    })))
}

#[axum::debug_handler]
pub async fn list_exceptions(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Path(professional_id): Path<Uuid>,
    Query(query): Query<ExceptionListQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ExceptionService::new(&state, bearer.token());
    let exceptions = service
        .list_exceptions(professional_id, query.from, query.to)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "professional_id": professional_id,
        "exceptions": exceptions,
    })))
}
