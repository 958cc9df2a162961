//! Control API Routes

use super::{
    auth::{auth_middleware, ApiAuth},
    handlers::*,
    types::ApiAuthConfig,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Control API router
pub struct ControlApi;

impl ControlApi {
    /// Create the control API router
    pub fn create_router(state: AppState, auth_config: ApiAuthConfig) -> Router {
        let auth = Arc::new(ApiAuth::new(auth_config));

        // Public routes (no authentication required)
        let public_routes = Router::new().route("/health", get(health_check));

        // Protected routes (authentication required)
        let protected_routes = Router::new()
            // Daemon status
            .route("/status", get(get_status))
            .route("/stats", get(get_stats))
            .route("/metrics/export", get(export_metrics))
            // Pool introspection
            .route("/servers", get(list_servers))
            .route("/servers/:host/:port/channels", get(list_channels))
            .route("/servers/:host/:port/connections", get(list_connections))
            .route(
                "/servers/:host/:port/connections/:name/channels",
                get(list_connection_channels),
            )
            // Channel management
            .route("/channels", post(add_channel))
            .route("/channels/remove", post(remove_channel))
            // Message delivery
            .route("/messages", post(send_message))
            // Add authentication middleware to protected routes
            .layer(middleware::from_fn_with_state(auth.clone(), auth_middleware))
            .with_state(state);

        // Combine public and protected routes
        Router::new()
            .nest("/api/v1", public_routes.merge(protected_routes))
            .layer(CorsLayer::permissive())
    }
}
