// ============================================================================
// TrustedUser Extractor - Gateway Auth Pattern
// ============================================================================
//
// Extracts caller identity from the X-User-Id header set by the gateway,
// which verifies credentials before forwarding.
//
// SECURITY: This extractor trusts the header unconditionally. Services using
// it MUST only be reachable through the gateway.
//
// ============================================================================

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use murmur_error::AppError;
use murmur_types::UserId;

/// Header name for user ID propagation
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity propagated from the gateway
#[derive(Debug, Clone)]
pub struct TrustedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for TrustedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                tracing::error!(
                    "Missing or invalid X-User-Id header. \
                     Is this request coming through the gateway?"
                );
                AppError::auth("authentication required").into_response()
            })?;

        tracing::trace!("TrustedUser extracted from header");

        Ok(TrustedUser(UserId::new(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_trusted_user_valid_header() {
        let mut parts = Request::builder()
            .uri("/api/posts")
            .header(USER_ID_HEADER, "user-42")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let user = TrustedUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.0, UserId::new("user-42"));
    }

    #[tokio::test]
    async fn test_trusted_user_missing_header() {
        let mut parts = Request::builder()
            .uri("/api/posts")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let rejection = TrustedUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_trusted_user_blank_header() {
        let mut parts = Request::builder()
            .uri("/api/posts")
            .header(USER_ID_HEADER, "   ")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        assert!(TrustedUser::from_request_parts(&mut parts, &()).await.is_err());
    }
}
