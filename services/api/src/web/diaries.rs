//! services/api/src/web/diaries.rs
//!
//! Read-side diary endpoints: completed-diary listing with search and date
//! filters, single lookup with the conversation log, and the photo gallery.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use momentbox_core::domain::{Diary, DiaryTurn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::port_error_response;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct DiaryListQuery {
    pub search: Option<String>,
    /// Limits results to diaries created on this day (YYYY-MM-DD).
    pub date: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DiaryDetail {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub diary: Diary,
    #[schema(value_type = Vec<Object>)]
    pub conversations: Vec<DiaryTurn>,
}

/// GET /api/diaries - Completed diaries, optionally filtered
#[utoipa::path(
    get,
    path = "/api/diaries",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive match on title or category"),
        ("date" = Option<String>, Query, description = "Same-day filter, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Matching diaries"),
        (status = 400, description = "Invalid date format"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_diaries_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<DiaryListQuery>,
) -> Result<Json<Vec<Diary>>, (StatusCode, String)> {
    let on_date = match &query.date {
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                "Invalid date format. Please use YYYY-MM-DD.".to_string(),
            )
        })?),
        None => None,
    };

    let diaries = state
        .diaries
        .list_diaries(user_id, query.search.as_deref(), on_date)
        .await
        .map_err(port_error_response)?;
    Ok(Json(diaries))
}

/// GET /api/diaries/{diary_id} - One diary with its conversation log
#[utoipa::path(
    get,
    path = "/api/diaries/{diary_id}",
    params(("diary_id" = Uuid, Path, description = "The diary to fetch")),
    responses(
        (status = 200, description = "The diary and its conversation"),
        (status = 404, description = "Diary not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_diary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(diary_id): Path<Uuid>,
) -> Result<Json<DiaryDetail>, (StatusCode, String)> {
    let diary = state
        .diaries
        .get_diary(user_id, diary_id)
        .await
        .map_err(port_error_response)?;
    let conversations = state
        .db
        .get_diary_turns(diary_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(DiaryDetail {
        diary,
        conversations,
    }))
}

/// GET /api/diaries/gallery - Completed diaries with photos, newest first
#[utoipa::path(
    get,
    path = "/api/diaries/gallery",
    responses(
        (status = 200, description = "Diaries with photos"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn gallery_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<Diary>>, (StatusCode, String)> {
    let diaries = state
        .diaries
        .gallery(user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(diaries))
}
