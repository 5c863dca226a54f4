use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, CreateAppointmentRequest,
    PendingConfirmationQuery, RescheduleRequest, UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

fn map_appointment_error(err: AppointmentError) -> AppError {
    match err {
        AppointmentError::Validation(message) => AppError::ValidationError(message),
        AppointmentError::NotFound(message) => AppError::NotFound(message),
        AppointmentError::Conflict(message) => AppError::Conflict(message),
        transition @ AppointmentError::InvalidStatusTransition { .. } => {
            AppError::ValidationError(transition.to_string())
        }
        AppointmentError::Database(message) => AppError::Database(message),
        AppointmentError::Configuration(message) => AppError::Internal(message),
    }
}

fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

fn is_admin(user: &User) -> bool {
    user.role.as_deref() == Some("admin")
}

fn is_participant(user: &User, appointment: &Appointment) -> bool {
    appointment.client_id.to_string() == user.id
        || appointment.professional_id.to_string() == user.id
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let books_own = request.client_id.to_string() == user.id;
    let books_for_others = matches!(user.role.as_deref(), Some("admin") | Some("professional"));
    if !books_own && !books_for_others {
        return Err(AppError::Auth(
            "Not authorized to book for this client".to_string(),
        ));
    }

    let service =
        AppointmentBookingService::new(&state, auth.token()).map_err(map_appointment_error)?;
    let appointment = service
        .book_appointment(&request)
        .await
        .map_err(map_appointment_error)?;

    info!("Appointment {} booked by user {}", appointment.id, user.id);

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service =
        AppointmentBookingService::new(&state, auth.token()).map_err(map_appointment_error)?;
    let appointment = service
        .get_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    if !is_admin(&user) && !is_participant(&user, &appointment) {
        return Err(AppError::Auth(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    // non-admins only ever see their own appointments
    match user.role.as_deref() {
        Some("admin") => {}
        Some("professional") => query.professional_id = Some(user_uuid(&user)?),
        _ => query.client_id = Some(user_uuid(&user)?),
    }

    debug!("Appointment search by user {}", user.id);

    let service =
        AppointmentBookingService::new(&state, auth.token()).map_err(map_appointment_error)?;
    let appointments = service
        .search_appointments(&query)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "count": appointments.len(),
        "appointments": appointments,
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service =
        AppointmentBookingService::new(&state, auth.token()).map_err(map_appointment_error)?;
    let appointment = service
        .get_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    if !is_admin(&user) && !is_participant(&user, &appointment) {
        return Err(AppError::Auth(
            "Not authorized to modify this appointment".to_string(),
        ));
    }
    let is_client_only = appointment.client_id.to_string() == user.id
        && appointment.professional_id.to_string() != user.id
        && !is_admin(&user);
    if is_client_only && request.status != AppointmentStatus::Cancelled {
        return Err(AppError::Auth(
            "Clients may only cancel their appointments".to_string(),
        ));
    }

    let updated = service
        .update_status(appointment_id, request.status)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": updated,
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let service =
        AppointmentBookingService::new(&state, auth.token()).map_err(map_appointment_error)?;
    let appointment = service
        .get_appointment(appointment_id)
        .await
        .map_err(map_appointment_error)?;

    if !is_admin(&user) && !is_participant(&user, &appointment) {
        return Err(AppError::Auth(
            "Not authorized to reschedule this appointment".to_string(),
        ));
    }

    let updated = service
        .reschedule_appointment(appointment_id, &request)
        .await
        .map_err(map_appointment_error)?;

    info!(
        "Appointment {} rescheduled by user {}",
        appointment_id, user.id
    );

    Ok(Json(json!({
        "success": true,
        "appointment": updated,
    })))
}

#[axum::debug_handler]
pub async fn pending_confirmations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PendingConfirmationQuery>,
) -> Result<Json<Value>, AppError> {
    // professionals see their own queue; admins may inspect any
    let professional_id = match user.role.as_deref() {
        Some("professional") => Some(user_uuid(&user)?),
        Some("admin") => query.professional_id,
        _ => {
            return Err(AppError::Auth(
                "Only professionals and admins can list pending confirmations".to_string(),
            ));
        }
    };

    let service =
        AppointmentBookingService::new(&state, auth.token()).map_err(map_appointment_error)?;
    let appointments = service
        .pending_confirmations(professional_id, query.date)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "count": appointments.len(),
        "appointments": appointments,
    })))
}
