//! crates/momentbox_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core engines to be independent of the database, the generative model, the
//! speech services, and object storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Appliance, ApplianceKind, Diary, DiaryPatch, DiaryTurn, MediaItem, PhotoRef, SpeechAudio,
    User, UserCredentials, UserQuest, UserView,
};
use crate::session::{ChatSession, ChatSessionRecord, ChatTurn};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Upstream service error: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Database Port
//=========================================================================================

/// The document-store boundary. Every engine re-reads current state through
/// this trait; no in-memory caches are kept across requests.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth and users ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        starting_points: i64,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_view(&self, user_id: Uuid) -> PortResult<UserView>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Points and closet ---

    /// Atomically debits `price` and adds `item_id` to the closet, but only
    /// when the balance covers the price. Returns false when it does not.
    async fn purchase_item(&self, user_id: Uuid, item_id: &str, price: i64) -> PortResult<bool>;

    /// Overwrites the equipped slot for one category, leaving other slots.
    async fn equip_item(&self, user_id: Uuid, category: &str, item_id: &str) -> PortResult<()>;

    /// Credits quest reward points; returns the new balance.
    async fn credit_points(&self, user_id: Uuid, amount: i64) -> PortResult<i64>;

    // --- Appliances ---
    async fn list_appliances(&self, user_id: Uuid) -> PortResult<Vec<Appliance>>;

    async fn get_appliance(&self, user_id: Uuid, name: &str) -> PortResult<Appliance>;

    /// Fails with `Conflict` when the user already has an appliance by that
    /// name.
    async fn insert_appliance(&self, appliance: &Appliance) -> PortResult<()>;

    /// Whole-row update keyed by (user, name).
    async fn save_appliance(&self, appliance: &Appliance) -> PortResult<()>;

    async fn delete_appliance(&self, user_id: Uuid, name: &str) -> PortResult<bool>;

    /// Sets `weekly_duration_sec` to zero on all of the user's appliances.
    async fn reset_weekly_durations(&self, user_id: Uuid) -> PortResult<()>;

    /// Live sum of `weekly_duration_sec` across the user's appliances of one
    /// kind.
    async fn sum_weekly_duration(&self, user_id: Uuid, kind: ApplianceKind) -> PortResult<i64>;

    // --- Quest progress ---
    async fn get_user_quest(&self, user_id: Uuid, quest_id: Uuid) -> PortResult<Option<UserQuest>>;

    async fn insert_user_quest(&self, user_quest: &UserQuest) -> PortResult<()>;

    /// Updates progress/status/completed_at for an existing record.
    async fn save_user_quest(&self, user_quest: &UserQuest) -> PortResult<()>;

    /// Deletes the user's quest records assigned before `week_start`.
    /// Returns the number of purged records.
    async fn delete_stale_user_quests(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<u64>;

    /// Atomic conditional claim: flips completed+unclaimed to claimed in one
    /// step. Returns false when the record was not in that state, so a
    /// racing claim can never settle twice.
    async fn claim_user_quest(
        &self,
        user_id: Uuid,
        quest_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> PortResult<bool>;

    // --- Diaries ---
    async fn insert_diary(&self, diary: &Diary) -> PortResult<()>;

    async fn get_diary(&self, user_id: Uuid, diary_id: Uuid) -> PortResult<Diary>;

    async fn list_diaries(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        on_date: Option<chrono::NaiveDate>,
    ) -> PortResult<Vec<Diary>>;

    /// Completed diaries that have at least one photo, newest first.
    async fn list_gallery_diaries(&self, user_id: Uuid) -> PortResult<Vec<Diary>>;

    /// Appends one turn to the diary's conversation log and touches
    /// `updated_at`. The log is append-only.
    async fn append_diary_turn(
        &self,
        diary_id: Uuid,
        role: &str,
        content: &str,
        photo_url: Option<&str>,
    ) -> PortResult<()>;

    async fn get_diary_turns(&self, diary_id: Uuid) -> PortResult<Vec<DiaryTurn>>;

    /// Set-union of photo references onto the diary (no duplicates).
    async fn add_diary_photos(&self, diary_id: Uuid, photos: &[PhotoRef]) -> PortResult<()>;

    /// Applies only the provided fields. Fails with `NotFound` when the
    /// diary does not exist or is not owned by the user.
    async fn update_diary_fields(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
        patch: &DiaryPatch,
    ) -> PortResult<()>;

    // --- Chat session ---

    /// Loads the user's session row, or a default idle session at version 0
    /// when none exists yet.
    async fn load_chat_session(&self, user_id: Uuid) -> PortResult<ChatSessionRecord>;

    /// Compare-and-swap save: succeeds only when the stored version still
    /// equals `expected_version`, and returns the new version. Fails with
    /// `Conflict` otherwise.
    async fn save_chat_session(
        &self,
        user_id: Uuid,
        session: &ChatSession,
        expected_version: i64,
    ) -> PortResult<i64>;

    // --- Media ---
    async fn insert_media(&self, item: &MediaItem) -> PortResult<()>;

    async fn set_media_completed(&self, media_id: Uuid, url: &str) -> PortResult<()>;

    async fn delete_media(&self, user_id: Uuid, media_id: Uuid) -> PortResult<bool>;

    async fn get_media(&self, user_id: Uuid, media_id: Uuid) -> PortResult<MediaItem>;

    async fn list_media(&self, user_id: Uuid) -> PortResult<Vec<MediaItem>>;
}

//=========================================================================================
// Generative Model Port
//=========================================================================================

/// Image bytes handed to the model alongside a photo prompt.
#[derive(Debug, Clone)]
pub struct PhotoAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// The generative text service behind the diary coach. Transient upstream
/// failures surface as `PortError::Upstream`.
#[async_trait]
pub trait CoachModelService: Send + Sync {
    /// Replays the full session history plus one new input and returns the
    /// model's reply.
    async fn chat(&self, history: &[ChatTurn], input: &str) -> PortResult<String>;

    /// A fresh, single-turn exchange about one photo. Photo turns are never
    /// chained onto prior history.
    async fn photo_turn(
        &self,
        prompt: &str,
        image: Option<PhotoAttachment>,
    ) -> PortResult<String>;

    /// One-shot prompt-in, text-out completion (diary summaries).
    async fn generate(&self, prompt: &str) -> PortResult<String>;
}

//=========================================================================================
// Speech Ports
//=========================================================================================

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes audio in an arbitrary container into text.
    async fn transcribe_audio(&self, audio_data: &[u8], filename: &str) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Synthesizes speech for `text`. The speaker selector is adapter
    /// specific; implementations may ignore it.
    async fn synthesize(&self, text: &str, speaker: &str) -> PortResult<SpeechAudio>;
}

//=========================================================================================
// Object Storage Port
//=========================================================================================

/// Blob storage keyed by opaque references. `fetch` accepts the public URL
/// form returned by `store`.
#[async_trait]
pub trait ObjectStorageService: Send + Sync {
    /// Raw bytes for a reference, or `NotFound`.
    async fn fetch(&self, reference: &str) -> PortResult<Vec<u8>>;

    /// Stores bytes under `key` and returns a publicly resolvable URL.
    async fn store(&self, key: &str, bytes: &[u8], content_type: &str) -> PortResult<String>;

    async fn exists(&self, reference: &str) -> PortResult<bool>;

    async fn delete(&self, reference: &str) -> PortResult<()>;
}
