//! services/api/src/web/shop.rs
//!
//! The cosmetic shop: catalog listing, purchases, and equipping.

use axum::{extract::State, http::StatusCode, Extension, Json};
use momentbox_core::domain::{ShopItem, UserView};
use momentbox_core::shop::catalog;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::port_error_response;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct ItemRequest {
    pub item_id: String,
}

/// GET /api/shop - The full item catalog
#[utoipa::path(
    get,
    path = "/api/shop",
    responses((status = 200, description = "Catalog items"))
)]
pub async fn list_shop_handler() -> Json<Vec<ShopItem>> {
    Json(catalog())
}

/// POST /api/closet/purchase - Buy a catalog item with points
#[utoipa::path(
    post,
    path = "/api/closet/purchase",
    request_body = ItemRequest,
    responses(
        (status = 200, description = "Refreshed user view"),
        (status = 400, description = "Already owned or not enough points"),
        (status = 404, description = "Unknown item"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn purchase_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ItemRequest>,
) -> Result<Json<UserView>, (StatusCode, String)> {
    let view = state
        .shop
        .purchase(user_id, &req.item_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(view))
}

/// POST /api/closet/equip - Equip an owned item into its category slot
#[utoipa::path(
    post,
    path = "/api/closet/equip",
    request_body = ItemRequest,
    responses(
        (status = 200, description = "Refreshed user view"),
        (status = 400, description = "Item not owned"),
        (status = 404, description = "Unknown item"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn equip_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ItemRequest>,
) -> Result<Json<UserView>, (StatusCode, String)> {
    let view = state
        .shop
        .equip(user_id, &req.item_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(view))
}
