use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;
use std::sync::Arc;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/search", get(handlers::search_open_slots))
        .route("/day/{professional_id}/{date}", get(handlers::get_day_slots))
        .route(
            "/template/{professional_id}",
            put(handlers::replace_weekly_template).get(handlers::get_weekly_template),
        )
        .route("/exceptions", post(handlers::create_exception))
        .route("/exceptions/{exception_id}", delete(handlers::deactivate_exception))
        .route(
            "/exceptions/professional/{professional_id}",
            get(handlers::list_exceptions),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
