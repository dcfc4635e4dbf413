// src/handlers/videos.rs
//! Video queue item endpoints - inspect and prune the secondary assembly
//! queue

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get},
    Router,
};
use std::sync::Arc;

use crate::AppState;

/// GET /api/videos - every assembly item with progress and current step
pub async fn list_video_items(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let items = state.queue.list_video_items().await;
    Json(serde_json::json!({
        "item_count": items.len(),
        "items": items,
    }))
}

/// DELETE /api/videos/:item_id
pub async fn remove_video_item(
    Path(item_id): Path<u64>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.queue.remove_video_item(item_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

/// Routes for the video assembly queue
pub fn video_routes() -> Router {
    Router::new()
        .route("/api/videos", get(list_video_items))
        .route("/api/videos/:item_id", delete(remove_video_item))
}
