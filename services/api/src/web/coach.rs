//! services/api/src/web/coach.rs
//!
//! The diary coach endpoints: conversation control, diary lifecycle, and the
//! speech in/out edges.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use momentbox_core::coach::{NextPhotoOutcome, PhotoTurnOutcome};
use momentbox_core::diary::GeneratedDiary;
use momentbox_core::domain::{Diary, DiaryPatch};
use momentbox_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::port_error_response;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub response: String,
}

#[derive(Deserialize, ToSchema)]
pub struct StartPhotoSessionRequest {
    pub diary_id: Uuid,
    pub photo_urls: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DiaryIdRequest {
    pub diary_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub diary_id: Uuid,
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateDiaryRequest {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_speaker")]
    pub speaker: String,
}

fn default_speaker() -> String {
    "default".to_string()
}

#[derive(Deserialize, ToSchema)]
pub struct TtsRequest {
    pub diary_id: Uuid,
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct SttResponse {
    pub text: String,
}

//=========================================================================================
// Conversation Handlers
//=========================================================================================

/// POST /api/coach/init - Start (or restart) the general-chat session
#[utoipa::path(
    post,
    path = "/api/coach/init",
    responses(
        (status = 200, description = "Session reset to general chat", body = MessageResponse),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Session changed concurrently")
    )
)]
pub async fn init_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let message = state
        .coach
        .init_general_chat(user_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(MessageResponse {
        response: message.to_string(),
    }))
}

/// POST /api/coach/photo-session - Begin a photo session over selected photos
#[utoipa::path(
    post,
    path = "/api/coach/photo-session",
    request_body = StartPhotoSessionRequest,
    responses(
        (status = 200, description = "First photo turn"),
        (status = 400, description = "No photos selected"),
        (status = 404, description = "Diary not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn start_photo_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<StartPhotoSessionRequest>,
) -> Result<Json<PhotoTurnOutcome>, (StatusCode, String)> {
    let outcome = state
        .coach
        .start_photo_session(user_id, req.diary_id, req.photo_urls)
        .await
        .map_err(port_error_response)?;
    Ok(Json(outcome))
}

/// POST /api/coach/next-photo - Advance to the next photo or wrap up
#[utoipa::path(
    post,
    path = "/api/coach/next-photo",
    request_body = DiaryIdRequest,
    responses(
        (status = 200, description = "Next photo turn, or the wrap-up"),
        (status = 400, description = "No photo session in progress"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn next_photo_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<DiaryIdRequest>,
) -> Result<Json<NextPhotoOutcome>, (StatusCode, String)> {
    let outcome = state
        .coach
        .advance_photo(user_id, req.diary_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(outcome))
}

/// POST /api/coach/chat - One general-chat exchange
#[utoipa::path(
    post,
    path = "/api/coach/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The coach's reply", body = MessageResponse),
        (status = 400, description = "Empty input or session not started"),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Session changed concurrently")
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let response = state
        .coach
        .process_text_input(user_id, req.diary_id, &req.text)
        .await
        .map_err(port_error_response)?;
    Ok(Json(MessageResponse { response }))
}

//=========================================================================================
// Diary Lifecycle Handlers
//=========================================================================================

/// POST /api/coach/diaries - Open a new diary for today's conversation
#[utoipa::path(
    post,
    path = "/api/coach/diaries",
    request_body = CreateDiaryRequest,
    responses(
        (status = 201, description = "New ongoing diary"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_diary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateDiaryRequest>,
) -> Result<(StatusCode, Json<Diary>), (StatusCode, String)> {
    let diary = state
        .diaries
        .create_diary(user_id, req.categories, req.speaker)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(diary)))
}

/// POST /api/coach/diaries/{diary_id}/generate - Generate title and entry
#[utoipa::path(
    post,
    path = "/api/coach/diaries/{diary_id}/generate",
    params(("diary_id" = Uuid, Path, description = "The diary to summarize")),
    responses(
        (status = 200, description = "Generated diary content"),
        (status = 404, description = "Diary not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn generate_diary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(diary_id): Path<Uuid>,
) -> Result<Json<GeneratedDiary>, (StatusCode, String)> {
    let generated = state
        .diaries
        .generate_summary(user_id, diary_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(generated))
}

/// PUT /api/coach/diaries/{diary_id} - Edit diary fields
#[utoipa::path(
    put,
    path = "/api/coach/diaries/{diary_id}",
    params(("diary_id" = Uuid, Path, description = "The diary to edit")),
    responses(
        (status = 200, description = "Updated diary"),
        (status = 400, description = "Empty patch"),
        (status = 404, description = "Diary not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_diary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(diary_id): Path<Uuid>,
    Json(patch): Json<DiaryPatch>,
) -> Result<Json<Diary>, (StatusCode, String)> {
    let diary = state
        .diaries
        .update_diary(user_id, diary_id, patch)
        .await
        .map_err(port_error_response)?;
    Ok(Json(diary))
}

//=========================================================================================
// Speech Handlers
//=========================================================================================

/// POST /api/coach/tts - Synthesize speech for a diary's configured speaker
#[utoipa::path(
    post,
    path = "/api/coach/tts",
    request_body = TtsRequest,
    responses(
        (status = 200, description = "Raw audio bytes", content_type = "audio/mpeg"),
        (status = 404, description = "Diary not found"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn tts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<TtsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Text is required".to_string()));
    }
    // The diary's speaker setting picks the synthesis path.
    let diary = state
        .diaries
        .get_diary(user_id, req.diary_id)
        .await
        .map_err(port_error_response)?;

    let audio = state
        .tts_adapter
        .synthesize(&req.text, &diary.speaker)
        .await
        .map_err(port_error_response)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, audio.format.content_type())],
        audio.bytes,
    ))
}

/// POST /api/coach/stt - Transcribe an uploaded audio file
#[utoipa::path(
    post,
    path = "/api/coach/stt",
    request_body(content_type = "multipart/form-data", description = "The audio file to transcribe."),
    responses(
        (status = 200, description = "Transcribed text", body = SttResponse),
        (status = 400, description = "Missing file or unrecognizable audio"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn stt_handler(
    State(state): State<Arc<AppState>>,
    Extension(_user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SttResponse>, (StatusCode, String)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {e}"),
            )
        })?
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Multipart form must include an audio file".to_string(),
        ))?;

    let filename = field.file_name().unwrap_or("audio.webm").to_string();
    let data = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read audio bytes: {e}"),
        )
    })?;
    if data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Audio file is empty".to_string()));
    }

    let text = state
        .stt_adapter
        .transcribe_audio(&data, &filename)
        .await
        .map_err(|e| match e {
            // Recognition failures are the client's problem, not ours.
            PortError::Upstream(msg) => (StatusCode::BAD_REQUEST, msg),
            other => port_error_response(other),
        })?;
    Ok(Json(SttResponse { text }))
}
