//! services/api/src/web/mod.rs
//!
//! The HTTP surface: route handlers grouped by feature, the shared state,
//! and the OpenAPI master definition.

use axum::http::StatusCode;
use momentbox_core::ports::PortError;
use tracing::error;
use utoipa::OpenApi;

pub mod auth;
pub mod coach;
pub mod devices;
pub mod diaries;
pub mod media;
pub mod middleware;
pub mod quests;
pub mod shop;
pub mod state;

pub use middleware::require_auth;

/// Maps a port error onto the HTTP response the client sees. Upstream and
/// unexpected failures are logged here and reported as a bare 500.
pub(crate) fn port_error_response(err: PortError) -> (StatusCode, String) {
    match err {
        PortError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Upstream(msg) | PortError::Unexpected(msg) => {
            error!("request failed: {msg}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            )
        }
    }
}

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        quests::list_quests_handler,
        quests::claim_quest_handler,
        devices::list_appliances_handler,
        devices::get_appliance_handler,
        devices::add_appliance_handler,
        devices::delete_appliance_handler,
        devices::control_appliance_handler,
        devices::simulate_appliance_handler,
        devices::master_list_handler,
        devices::categories_handler,
        coach::init_chat_handler,
        coach::start_photo_session_handler,
        coach::next_photo_handler,
        coach::chat_handler,
        coach::create_diary_handler,
        coach::generate_diary_handler,
        coach::update_diary_handler,
        coach::tts_handler,
        coach::stt_handler,
        diaries::list_diaries_handler,
        diaries::get_diary_handler,
        diaries::gallery_handler,
        shop::list_shop_handler,
        shop::purchase_handler,
        shop::equip_handler,
        media::upload_media_handler,
        media::list_media_handler,
        media::get_media_handler,
        media::delete_media_handler,
    ),
    tags(
        (name = "momentbox API", description = "Diary coach, appliance quests, and the cosmetic shop.")
    )
)]
pub struct ApiDoc;
