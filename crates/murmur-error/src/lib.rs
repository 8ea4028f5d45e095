use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Request-layer error for the murmur services
///
/// Infrastructure failures at the edges (broker, cache) are normally absorbed
/// before they reach this type; the variants exist for the paths where they
/// cannot be (start-up, health checks, handler-level reporting).
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Infrastructure Errors =====
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Event handler failed: {0}")]
    HandlerFailure(String),

    #[error("Remote storage error: {0}")]
    Storage(String),

    // ===== Catalog Errors =====
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Authentication & Authorization Errors =====
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ===== Validation Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Internal Server Errors =====
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BrokerUnavailable(_) | AppError::CacheUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Auth(msg) => format!("Authentication failed: {}", msg),
            AppError::Forbidden(msg) => format!("Forbidden: {}", msg),
            AppError::Validation(msg) => format!("Validation error: {}", msg),
            AppError::Json(_) => "Malformed JSON body".to_string(),
            AppError::NotFound(msg) => format!("Not found: {}", msg),
            AppError::BrokerUnavailable(_) => "Message broker unavailable".to_string(),
            AppError::CacheUnavailable(_) => "Cache unavailable".to_string(),
            AppError::Storage(_) => "External storage error".to_string(),
            AppError::Catalog(_) => "Database error".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BrokerUnavailable(_) => "BROKER_UNAVAILABLE",
            AppError::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            AppError::HandlerFailure(_) => "HANDLER_FAILURE",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Catalog(_) => "CATALOG_ERROR",
            AppError::Json(_) => "INVALID_JSON",
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Authorization failed"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let error_code = self.error_code();

        let response_body = if status.is_server_error() {
            // For server errors, don't expose internal details to client
            json!({
                "error": "Internal server error",
                "error_code": error_code,
                "status": status.as_u16(),
            })
        } else {
            json!({
                "error": self.user_message(),
                "error_code": error_code,
                "status": status.as_u16(),
            })
        };

        (status, axum::Json(response_body)).into_response()
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl AppError {
    pub fn auth(msg: impl Into<String>) -> Self {
        AppError::Auth(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        AppError::Catalog(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::BrokerUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::catalog("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_server_error_hides_details() {
        let response = AppError::catalog("connection refused on 10.0.0.3").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.3"));
        assert!(text.contains("CATALOG_ERROR"));
    }

    #[tokio::test]
    async fn test_client_error_carries_message() {
        let response = AppError::validation("content too short").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error_code"], "VALIDATION_ERROR");
        assert_eq!(value["status"], 400);
    }
}
