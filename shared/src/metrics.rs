//! Prometheus endpoint for the services
//!
//! ```ignore
//! .route("/metrics", get(murmur_shared::metrics::metrics_handler))
//! ```

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use murmur_metrics::gather_metrics;

pub async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to gather metrics: {}", e),
        )
            .into_response(),
    }
}
