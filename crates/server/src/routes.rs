//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for probes)
        .route("/health", get(handlers::health_check))
        .route("/api/uploads/stats", get(handlers::get_upload_stats))
        .route(
            "/api/uploads/{upload_id}",
            get(handlers::get_upload)
                .post(handlers::upload_part)
                .delete(handlers::delete_upload),
        );

    let mut router = Router::new().merge(api_routes);

    // When enabled, this endpoint should be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router
        // Resolves the bearer token and sets the AuthenticatedUser extension
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
