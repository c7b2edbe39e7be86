//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use momentbox_core::coach::CoachEngine;
use momentbox_core::diary::DiaryEngine;
use momentbox_core::ports::{
    DatabaseService, ObjectStorageService, SpeechToTextService, TextToSpeechService,
};
use momentbox_core::quests::QuestEngine;
use momentbox_core::shop::ShopEngine;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
///
/// The engines own their port handles; the raw ports are also kept here for
/// the handlers that talk to them directly (auth, speech, media).
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseService>,
    pub storage: Arc<dyn ObjectStorageService>,
    pub stt_adapter: Arc<dyn SpeechToTextService>,
    pub tts_adapter: Arc<dyn TextToSpeechService>,
    pub quests: QuestEngine,
    pub coach: CoachEngine,
    pub diaries: DiaryEngine,
    pub shop: ShopEngine,
}
