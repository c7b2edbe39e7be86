//! services/api/src/web/media.rs
//!
//! Media upload and management. Uploads are recorded as `uploading` before
//! the bytes touch object storage and flipped to `completed` with the public
//! URL afterwards, so a crashed upload never surfaces as a finished item.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use momentbox_core::domain::{MediaItem, MediaStatus};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::port_error_response;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub id: Uuid,
    pub url: String,
}

/// POST /api/media - Upload one media file (multipart)
#[utoipa::path(
    post,
    path = "/api/media",
    request_body(content_type = "multipart/form-data", description = "A `file` part plus an optional `description` part."),
    responses(
        (status = 201, description = "Upload complete", body = UploadResponse),
        (status = 400, description = "No file in the form"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn upload_media_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), (StatusCode, String)> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut description = String::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {e}"),
        )
    })? {
        match field.name() {
            Some("description") => {
                description = field.text().await.unwrap_or_default();
            }
            _ => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read file bytes: {e}"),
                    )
                })?;
                file = Some((filename, content_type, data.to_vec()));
            }
        }
    }

    let (filename, content_type, data) = file.ok_or((
        StatusCode::BAD_REQUEST,
        "Multipart form must include a file".to_string(),
    ))?;

    // 1. Pre-insert the row as uploading
    let item = MediaItem {
        id: Uuid::new_v4(),
        user_id,
        filename: filename.clone(),
        url: None,
        description,
        status: MediaStatus::Uploading,
        created_at: Utc::now(),
    };
    state
        .db
        .insert_media(&item)
        .await
        .map_err(port_error_response)?;

    // 2. Store the object under a timestamped per-user key
    let key = format!(
        "{user_id}/{}_{filename}",
        Utc::now().format("%Y%m%d%H%M%S")
    );
    let url = match state.storage.store(&key, &data, &content_type).await {
        Ok(url) => url,
        Err(e) => {
            // 3. A failed upload takes its pre-inserted row with it
            if let Err(del) = state.db.delete_media(user_id, item.id).await {
                warn!("Failed to clean up media row {}: {:?}", item.id, del);
            }
            return Err(port_error_response(e));
        }
    };

    // 4. Flip the row to completed with the public URL
    state
        .db
        .set_media_completed(item.id, &url)
        .await
        .map_err(port_error_response)?;

    Ok((StatusCode::CREATED, Json(UploadResponse { id: item.id, url })))
}

/// GET /api/media - Completed uploads, newest first
#[utoipa::path(
    get,
    path = "/api/media",
    responses(
        (status = 200, description = "The user's media items"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_media_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<MediaItem>>, (StatusCode, String)> {
    let items = state
        .db
        .list_media(user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(items))
}

/// GET /api/media/{media_id} - One media item
#[utoipa::path(
    get,
    path = "/api/media/{media_id}",
    params(("media_id" = Uuid, Path, description = "The media item to fetch")),
    responses(
        (status = 200, description = "The media item"),
        (status = 404, description = "Media not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_media_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(media_id): Path<Uuid>,
) -> Result<Json<MediaItem>, (StatusCode, String)> {
    let item = state
        .db
        .get_media(user_id, media_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(item))
}

/// DELETE /api/media/{media_id} - Delete a media item and its stored object
#[utoipa::path(
    delete,
    path = "/api/media/{media_id}",
    params(("media_id" = Uuid, Path, description = "The media item to delete")),
    responses(
        (status = 200, description = "Media deleted"),
        (status = 404, description = "Media not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn delete_media_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(media_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let item = state
        .db
        .get_media(user_id, media_id)
        .await
        .map_err(port_error_response)?;

    // Storage deletion is best-effort; the row is removed either way.
    if let Some(url) = &item.url {
        if let Err(e) = state.storage.delete(url).await {
            warn!("Failed to delete stored object {url}: {:?}", e);
        }
    }

    let deleted = state
        .db
        .delete_media(user_id, media_id)
        .await
        .map_err(port_error_response)?;
    if !deleted {
        return Err((StatusCode::NOT_FOUND, "Media not found".to_string()));
    }
    Ok(StatusCode::OK)
}
