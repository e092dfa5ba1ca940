//! Admin API.
//!
//! Bearer-token protected endpoints for inspecting and steering circuit
//! breakers and reading admission load.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::{admin_auth_middleware, AdminAuth};
use self::handlers::*;
use crate::config::AdminConfig;
use crate::http::server::AppState;

pub fn setup_admin_router(config: &AdminConfig) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/load", get(get_load))
        .route("/admin/breakers", get(list_breakers))
        .route("/admin/breakers/reset-all", post(reset_all))
        .route("/admin/breakers/{name}", get(get_breaker))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route("/admin/breakers/{name}/open", post(open_breaker))
        .route("/admin/breakers/{name}/close", post(close_breaker))
        .route_layer(middleware::from_fn_with_state(
            AdminAuth::new(&config.api_key),
            admin_auth_middleware,
        ))
}
