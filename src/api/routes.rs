//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    call_key_handler, entity_references_handler, health_handler, invalidate_all_handler,
    invalidate_call_handler, invalidate_entity_handler, invalidate_function_handler,
    stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/entities/:entity/:id",
            delete(invalidate_entity_handler).get(entity_references_handler),
        )
        .route("/functions/:name", delete(invalidate_function_handler))
        .route("/calls/invalidate", post(invalidate_call_handler))
        .route("/calls/key", post(call_key_handler))
        .route("/all", delete(invalidate_all_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
