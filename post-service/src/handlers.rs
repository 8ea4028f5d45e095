// ============================================================================
// Post Handlers
// ============================================================================
//
// POST   /api/posts        create (owner = caller)
// GET    /api/posts        listing, ?page=&limit=
// GET    /api/posts/:id    single post
// DELETE /api/posts/:id    delete (caller must own the post)
//
// ============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use murmur_error::AppResult;
use murmur_shared::content::{CreatePostRequest, ListQuery};
use murmur_shared::extractors::TrustedUser;
use murmur_types::PostId;
use serde_json::json;
use std::sync::Arc;

use crate::context::PostServiceContext;

pub async fn create_post(
    State(context): State<Arc<PostServiceContext>>,
    TrustedUser(user_id): TrustedUser,
    Json(request): Json<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let post = context.content.create(user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Post created successfully",
            "data": post,
        })),
    ))
}

pub async fn list_posts(
    State(context): State<Arc<PostServiceContext>>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let listing = context.content.list(query).await?;
    Ok(Json(listing))
}

pub async fn get_post(
    State(context): State<Arc<PostServiceContext>>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let post = context.content.get(&PostId::new(id)).await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(context): State<Arc<PostServiceContext>>,
    TrustedUser(user_id): TrustedUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    context.content.delete(&user_id, &PostId::new(id)).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Post deleted successfully",
    })))
}

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "service": "post"})),
    )
}
