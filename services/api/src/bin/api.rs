//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        coach_llm::OpenAiCoachAdapter,
        db::DbAdapter,
        sst::OpenAiSttAdapter,
        storage::LocalStorageAdapter,
        tts::{FallbackTtsAdapter, OpenAiTtsAdapter, VoiceServerTtsAdapter},
    },
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, me_handler, signup_handler},
        coach::{
            chat_handler, create_diary_handler, generate_diary_handler, init_chat_handler,
            next_photo_handler, start_photo_session_handler, stt_handler, tts_handler,
            update_diary_handler,
        },
        devices::{
            add_appliance_handler, categories_handler, control_appliance_handler,
            delete_appliance_handler, get_appliance_handler, list_appliances_handler,
            master_list_handler, simulate_appliance_handler,
        },
        diaries::{gallery_handler, get_diary_handler, list_diaries_handler},
        media::{
            delete_media_handler, get_media_handler, list_media_handler, upload_media_handler,
        },
        middleware::require_auth,
        quests::{claim_quest_handler, list_quests_handler},
        shop::{equip_handler, list_shop_handler, purchase_handler},
        state::AppState,
        ApiDoc,
    },
};
use async_openai::{
    config::OpenAIConfig,
    types::audio::{SpeechModel, Voice},
    Client,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use momentbox_core::coach::CoachEngine;
use momentbox_core::diary::DiaryEngine;
use momentbox_core::ports::{CoachModelService, ObjectStorageService, TextToSpeechService};
use momentbox_core::quests::QuestEngine;
use momentbox_core::shop::ShopEngine;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let stt_adapter = Arc::new(OpenAiSttAdapter::new(
        openai_client.clone(),
        config.stt_model.clone(),
    ));

    let tts_voice = match config.tts_voice.to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => {
            return Err(ApiError::Internal(format!(
                "Invalid TTS voice specified in config: '{}'",
                config.tts_voice
            )))
        }
    };
    let primary_tts: Arc<dyn TextToSpeechService> = Arc::new(OpenAiTtsAdapter::new(
        openai_client.clone(),
        SpeechModel::Tts1Hd,
        tts_voice,
    ));
    let voice_server_tts: Option<Arc<dyn TextToSpeechService>> =
        match config.voice_server_url.clone() {
            Some(url) => {
                info!("Voice server enabled at {url}");
                let adapter = VoiceServerTtsAdapter::new(url, config.voice_server_timeout)
                    .map_err(|e| {
                        ApiError::Internal(format!("Failed to build the voice server client: {e}"))
                    })?;
                Some(Arc::new(adapter))
            }
            None => None,
        };
    let tts_adapter = Arc::new(FallbackTtsAdapter::new(primary_tts, voice_server_tts));

    let coach_model: Arc<dyn CoachModelService> = Arc::new(OpenAiCoachAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
    ));

    let storage: Arc<dyn ObjectStorageService> = Arc::new(LocalStorageAdapter::new(
        config.media_root.clone(),
        config.media_base_url.clone(),
    ));

    // --- 4. Build the Engines & Shared AppState ---
    let quests = QuestEngine::new(db_adapter.clone());
    let coach = CoachEngine::new(db_adapter.clone(), coach_model.clone(), storage.clone());
    let diaries = DiaryEngine::new(db_adapter.clone(), coach_model);
    let shop = ShopEngine::new(db_adapter.clone());

    let app_state = Arc::new(AppState {
        config: config.clone(),
        db: db_adapter,
        storage,
        stt_adapter,
        tts_adapter,
        quests,
        coach,
        diaries,
        shop,
    });

    let allowed_origin = config
        .allowed_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {e}")))?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/users/me", get(me_handler))
        .route("/api/quests", get(list_quests_handler))
        .route("/api/quests/{quest_id}/claim", post(claim_quest_handler))
        .route(
            "/api/appliances",
            get(list_appliances_handler).post(add_appliance_handler),
        )
        .route("/api/appliances/master", get(master_list_handler))
        .route("/api/appliances/categories", get(categories_handler))
        .route(
            "/api/appliances/{name}",
            get(get_appliance_handler).delete(delete_appliance_handler),
        )
        .route(
            "/api/appliances/{name}/control",
            post(control_appliance_handler),
        )
        .route(
            "/api/appliances/{name}/simulate",
            post(simulate_appliance_handler),
        )
        .route("/api/coach/init", post(init_chat_handler))
        .route("/api/coach/photo-session", post(start_photo_session_handler))
        .route("/api/coach/next-photo", post(next_photo_handler))
        .route("/api/coach/chat", post(chat_handler))
        .route("/api/coach/diaries", post(create_diary_handler))
        .route(
            "/api/coach/diaries/{diary_id}/generate",
            post(generate_diary_handler),
        )
        .route("/api/coach/diaries/{diary_id}", put(update_diary_handler))
        .route("/api/coach/tts", post(tts_handler))
        .route("/api/coach/stt", post(stt_handler))
        .route("/api/diaries", get(list_diaries_handler))
        .route("/api/diaries/gallery", get(gallery_handler))
        .route("/api/diaries/{diary_id}", get(get_diary_handler))
        .route("/api/shop", get(list_shop_handler))
        .route("/api/closet/purchase", post(purchase_handler))
        .route("/api/closet/equip", post(equip_handler))
        .route(
            "/api/media",
            get(list_media_handler).post(upload_media_handler),
        )
        .route(
            "/api/media/{media_id}",
            get(get_media_handler).delete(delete_media_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/api/media/files", ServeDir::new(&config.media_root))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
