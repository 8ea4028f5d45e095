pub mod context;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use context::PostServiceContext;

pub fn router(context: Arc<PostServiceContext>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route(
            "/metrics",
            get(murmur_shared::metrics::metrics_handler),
        )
        .route(
            "/api/posts",
            post(handlers::create_post).get(handlers::list_posts),
        )
        .route(
            "/api/posts/:id",
            get(handlers::get_post).delete(handlers::delete_post),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(context)
}
