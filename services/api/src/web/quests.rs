//! services/api/src/web/quests.rs
//!
//! Weekly quest endpoints: the merged catalog/progress listing and the
//! reward claim.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use momentbox_core::domain::QuestView;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::port_error_response;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct ClaimResponse {
    pub quest_id: Uuid,
    pub points: i64,
}

/// GET /api/quests - This week's quests for the user's owned appliance kinds
#[utoipa::path(
    get,
    path = "/api/quests",
    responses(
        (status = 200, description = "Weekly quests with progress"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_quests_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<QuestView>>, (StatusCode, String)> {
    let quests = state
        .quests
        .list_user_weekly_quests(user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(quests))
}

/// POST /api/quests/{quest_id}/claim - Claim a completed quest's reward
#[utoipa::path(
    post,
    path = "/api/quests/{quest_id}/claim",
    params(("quest_id" = Uuid, Path, description = "The quest to claim")),
    responses(
        (status = 200, description = "Reward credited", body = ClaimResponse),
        (status = 400, description = "Quest not completed or already claimed"),
        (status = 404, description = "Quest not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn claim_quest_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(quest_id): Path<Uuid>,
) -> Result<Json<ClaimResponse>, (StatusCode, String)> {
    let points = state
        .quests
        .claim_quest(user_id, quest_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(ClaimResponse { quest_id, points }))
}
