// ============================================================================
// Media Handlers
// ============================================================================
//
// GET /api/media/all    assets owned by the caller (404 when there are none)
//
// ============================================================================

use axum::{extract::State, response::IntoResponse, Json};
use murmur_error::{AppError, AppResult};
use murmur_shared::broker::Connector;
use murmur_shared::catalog::bounded;
use murmur_shared::extractors::TrustedUser;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::context::MediaServiceContext;

pub async fn list_media<C: Connector>(
    State(context): State<Arc<MediaServiceContext<C>>>,
    TrustedUser(user_id): TrustedUser,
) -> AppResult<impl IntoResponse> {
    let media = bounded(context.catalog_timeout, context.assets.find_by_owner(&user_id)).await?;

    if media.is_empty() {
        return Err(AppError::not_found("No media found"));
    }
    info!(items = media.len(), "Media retrieved");

    Ok(Json(json!({
        "success": true,
        "message": "Media fetched successfully",
        "data": media,
    })))
}
