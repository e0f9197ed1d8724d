//! HTTP route definitions

use crate::{AppState, handlers, middleware};
use axum::{
    Router,
    routing::get,
    middleware as axum_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
};

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        // Account endpoints
        .route("/", get(handlers::list_containers).head(handlers::health_check))

        // Container endpoints
        .route(
            "/{container}",
            get(handlers::list_objects)
                .put(handlers::create_container)
                .head(handlers::head_container)
                .delete(handlers::delete_container),
        )

        // Object endpoints
        .route(
            "/{container}/{*object}",
            get(handlers::get_object)
                .put(handlers::put_object)
                .post(handlers::post_object)
                .head(handlers::head_object)
                .delete(handlers::delete_object),
        )

        // Apply middleware
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware));

    let router = if state.config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
        router.layer(cors)
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
