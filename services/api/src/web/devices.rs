//! services/api/src/web/devices.rs
//!
//! Appliance registry endpoints: the per-user instances, the control and
//! simulation transitions, and the read-only master catalog.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use momentbox_core::appliance::{
    apply_control, categories, find_template, simulate_usage, ApplianceTemplate, ControlCommand,
    MASTER_TEMPLATES,
};
use momentbox_core::domain::Appliance;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::port_error_response;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AddApplianceRequest {
    pub template_id: String,
    pub name: String,
}

/// The client-facing projection of a master catalog entry.
#[derive(Serialize, ToSchema)]
pub struct MasterTemplateView {
    pub id: &'static str,
    pub kind: &'static str,
    pub category: &'static str,
    pub model_name: &'static str,
    pub courses: Vec<&'static str>,
    pub modes: Vec<&'static str>,
    pub fan_speeds: Vec<&'static str>,
}

impl MasterTemplateView {
    fn from_template(t: &'static ApplianceTemplate) -> Self {
        Self {
            id: t.id,
            kind: t.kind.as_str(),
            category: t.category,
            model_name: t.model_name,
            courses: t.courses.to_vec(),
            modes: t.modes.to_vec(),
            fan_speeds: t.fan_speeds.to_vec(),
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/appliances - All of the user's appliance instances
#[utoipa::path(
    get,
    path = "/api/appliances",
    responses(
        (status = 200, description = "The user's appliances"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_appliances_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<Appliance>>, (StatusCode, String)> {
    let appliances = state
        .db
        .list_appliances(user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(appliances))
}

/// GET /api/appliances/{name} - One appliance by name
#[utoipa::path(
    get,
    path = "/api/appliances/{name}",
    params(("name" = String, Path, description = "The appliance's user-chosen name")),
    responses(
        (status = 200, description = "The appliance"),
        (status = 404, description = "No appliance by that name"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_appliance_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(name): Path<String>,
) -> Result<Json<Appliance>, (StatusCode, String)> {
    let appliance = state
        .db
        .get_appliance(user_id, &name)
        .await
        .map_err(port_error_response)?;
    Ok(Json(appliance))
}

/// POST /api/appliances - Add an appliance from a master template
#[utoipa::path(
    post,
    path = "/api/appliances",
    request_body = AddApplianceRequest,
    responses(
        (status = 201, description = "Appliance created"),
        (status = 400, description = "Unknown template or empty name"),
        (status = 409, description = "Name already in use"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn add_appliance_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<AddApplianceRequest>,
) -> Result<(StatusCode, Json<Appliance>), (StatusCode, String)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Appliance name is required".to_string(),
        ));
    }
    let template = find_template(&req.template_id).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown appliance template '{}'", req.template_id),
        )
    })?;

    let appliance = template.instantiate(user_id, name, Utc::now());
    state
        .db
        .insert_appliance(&appliance)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(appliance)))
}

/// DELETE /api/appliances/{name} - Remove an appliance instance
#[utoipa::path(
    delete,
    path = "/api/appliances/{name}",
    params(("name" = String, Path, description = "The appliance's user-chosen name")),
    responses(
        (status = 200, description = "Appliance deleted"),
        (status = 404, description = "No appliance by that name"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn delete_appliance_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(name): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let deleted = state
        .db
        .delete_appliance(user_id, &name)
        .await
        .map_err(port_error_response)?;
    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Appliance '{name}' not found"),
        ));
    }
    Ok(StatusCode::OK)
}

/// POST /api/appliances/{name}/control - Apply one control command
#[utoipa::path(
    post,
    path = "/api/appliances/{name}/control",
    params(("name" = String, Path, description = "The appliance's user-chosen name")),
    responses(
        (status = 200, description = "Updated appliance state"),
        (status = 400, description = "Command not in the appliance's vocabulary"),
        (status = 404, description = "No appliance by that name"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn control_appliance_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(name): Path<String>,
    Json(command): Json<ControlCommand>,
) -> Result<Json<Appliance>, (StatusCode, String)> {
    let mut appliance = state
        .db
        .get_appliance(user_id, &name)
        .await
        .map_err(port_error_response)?;

    let delta =
        apply_control(&mut appliance, &command, Utc::now()).map_err(port_error_response)?;
    state
        .db
        .save_appliance(&appliance)
        .await
        .map_err(port_error_response)?;

    // Usage that moved the counters feeds the weekly quest progress.
    if delta.is_quest_relevant() {
        state
            .quests
            .record_appliance_event(user_id, &name)
            .await
            .map_err(port_error_response)?;
    }
    Ok(Json(appliance))
}

/// POST /api/appliances/{name}/simulate - Advance the run-cycle one step
#[utoipa::path(
    post,
    path = "/api/appliances/{name}/simulate",
    params(("name" = String, Path, description = "The appliance's user-chosen name")),
    responses(
        (status = 200, description = "Updated appliance state"),
        (status = 404, description = "No appliance by that name"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn simulate_appliance_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(name): Path<String>,
) -> Result<Json<Appliance>, (StatusCode, String)> {
    let mut appliance = state
        .db
        .get_appliance(user_id, &name)
        .await
        .map_err(port_error_response)?;

    let delta = simulate_usage(&mut appliance, Utc::now());
    state
        .db
        .save_appliance(&appliance)
        .await
        .map_err(port_error_response)?;

    if delta.is_quest_relevant() {
        state
            .quests
            .record_appliance_event(user_id, &name)
            .await
            .map_err(port_error_response)?;
    }
    Ok(Json(appliance))
}

/// GET /api/appliances/master - The master appliance catalog
#[utoipa::path(
    get,
    path = "/api/appliances/master",
    responses((status = 200, description = "Master catalog entries"))
)]
pub async fn master_list_handler() -> Json<Vec<MasterTemplateView>> {
    Json(
        MASTER_TEMPLATES
            .iter()
            .map(MasterTemplateView::from_template)
            .collect(),
    )
}

/// GET /api/appliances/categories - Distinct catalog categories
#[utoipa::path(
    get,
    path = "/api/appliances/categories",
    responses((status = 200, description = "Category names"))
)]
pub async fn categories_handler() -> Json<Vec<&'static str>> {
    Json(categories())
}
