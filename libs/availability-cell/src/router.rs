use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/doctor/{doctor_id}", get(handlers::get_doctor_slots_public));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/", get(handlers::get_weekly_availability))
        .route("/set", post(handlers::set_availability))
        .route("/{day}/add-slot", post(handlers::add_slot))
        .route("/{day}/remove-slot", post(handlers::remove_slot))
        .route("/{day}", delete(handlers::delete_availability))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
