use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    book_appointment, get_appointment, pending_confirmations, reschedule_appointment,
    search_appointments, update_appointment_status,
};

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(book_appointment).get(search_appointments))
        .route("/pending-confirmation", get(pending_confirmations))
        .route("/{appointment_id}", get(get_appointment))
        .route("/{appointment_id}/status", patch(update_appointment_status))
        .route(
            "/{appointment_id}/reschedule",
            post(reschedule_appointment),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}
