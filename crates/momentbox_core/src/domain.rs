//! crates/momentbox_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or external service; the
//! serde derives exist only so the HTTP layer can return them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// Represents a user - used throughout the app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// The client-facing view of a user: points balance, closet, equipped slots.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub points: i64,
    pub closet: Vec<String>,
    pub equipped_items: BTreeMap<String, String>,
}

//=========================================================================================
// Quests
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Count,
    DurationHours,
}

/// A weekly quest catalog entry. Immutable for a given week; the catalog is
/// generated from a static template keyed by the week-start timestamp, so
/// quest ids are deterministic per week.
#[derive(Debug, Clone, Serialize)]
pub struct Quest {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub reward: i64,
    pub goal: i64,
    pub goal_type: GoalType,
    pub appliance_kind: ApplianceKind,
    pub week_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    InProgress,
    Completed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::InProgress => "in_progress",
            QuestStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(QuestStatus::InProgress),
            "completed" => Some(QuestStatus::Completed),
            _ => None,
        }
    }
}

/// Per-user progress against one weekly quest.
///
/// Invariant: `claimed` implies `status == Completed`. Progress never
/// decreases within a week; records for past weeks are purged on the next
/// user-facing read.
#[derive(Debug, Clone, Serialize)]
pub struct UserQuest {
    pub user_id: Uuid,
    pub quest_id: Uuid,
    pub week_start: DateTime<Utc>,
    pub progress: f64,
    pub status: QuestStatus,
    pub claimed: bool,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// The merged quest + progress view returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct QuestView {
    #[serde(flatten)]
    pub quest: Quest,
    pub user_progress: UserQuest,
}

//=========================================================================================
// Appliances
//=========================================================================================

/// The closed set of appliance kinds the registry knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplianceKind {
    Refrigerator,
    Washer,
    Dryer,
    Dishwasher,
    Styler,
    ShoeCare,
    Oven,
    MassageChair,
    RobotVacuum,
    Tv,
    AirConditioner,
    AirPurifier,
    AeroTower,
    Dehumidifier,
}

impl ApplianceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplianceKind::Refrigerator => "refrigerator",
            ApplianceKind::Washer => "washer",
            ApplianceKind::Dryer => "dryer",
            ApplianceKind::Dishwasher => "dishwasher",
            ApplianceKind::Styler => "styler",
            ApplianceKind::ShoeCare => "shoe_care",
            ApplianceKind::Oven => "oven",
            ApplianceKind::MassageChair => "massage_chair",
            ApplianceKind::RobotVacuum => "robot_vacuum",
            ApplianceKind::Tv => "tv",
            ApplianceKind::AirConditioner => "air_conditioner",
            ApplianceKind::AirPurifier => "air_purifier",
            ApplianceKind::AeroTower => "aero_tower",
            ApplianceKind::Dehumidifier => "dehumidifier",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refrigerator" => Some(ApplianceKind::Refrigerator),
            "washer" => Some(ApplianceKind::Washer),
            "dryer" => Some(ApplianceKind::Dryer),
            "dishwasher" => Some(ApplianceKind::Dishwasher),
            "styler" => Some(ApplianceKind::Styler),
            "shoe_care" => Some(ApplianceKind::ShoeCare),
            "oven" => Some(ApplianceKind::Oven),
            "massage_chair" => Some(ApplianceKind::MassageChair),
            "robot_vacuum" => Some(ApplianceKind::RobotVacuum),
            "tv" => Some(ApplianceKind::Tv),
            "air_conditioner" => Some(ApplianceKind::AirConditioner),
            "air_purifier" => Some(ApplianceKind::AirPurifier),
            "aero_tower" => Some(ApplianceKind::AeroTower),
            "dehumidifier" => Some(ApplianceKind::Dehumidifier),
            _ => None,
        }
    }
}

/// Run-cycle state for appliances that have one. Toggle-class appliances
/// carry no status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Waiting,
    Running,
    Completed,
    Docked,
    Cleaning,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Waiting => "waiting",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Docked => "docked",
            RunState::Cleaning => "cleaning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(RunState::Waiting),
            "running" => Some(RunState::Running),
            "completed" => Some(RunState::Completed),
            "docked" => Some(RunState::Docked),
            "cleaning" => Some(RunState::Cleaning),
            _ => None,
        }
    }
}

/// A user-named appliance instance created from a master template.
///
/// Invariant: `power_on_at` is `Some` iff `power` is true. Every power-off
/// path accumulates the elapsed on-duration into `weekly_duration_sec`.
#[derive(Debug, Clone, Serialize)]
pub struct Appliance {
    pub user_id: Uuid,
    pub name: String,
    pub kind: ApplianceKind,
    pub model_name: String,
    pub category: String,
    pub power: bool,
    pub status: Option<RunState>,
    pub course: Option<String>,
    pub courses: Vec<String>,
    pub course_times: BTreeMap<String, i64>,
    pub mode: Option<String>,
    pub modes: Vec<String>,
    pub fan_speed: Option<String>,
    pub fan_speeds: Vec<String>,
    pub temperature: Option<i32>,
    pub total_time_sec: i64,
    pub remaining_time_sec: i64,
    pub run_count: i64,
    pub weekly_duration_sec: i64,
    pub power_on_at: Option<DateTime<Utc>>,
    pub cycle_started_at: Option<DateTime<Utc>>,
}

//=========================================================================================
// Diaries
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiaryStatus {
    Ongoing,
    Completed,
}

impl DiaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiaryStatus::Ongoing => "ongoing",
            DiaryStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ongoing" => Some(DiaryStatus::Ongoing),
            "completed" => Some(DiaryStatus::Completed),
            _ => None,
        }
    }
}

/// A photo attached to a diary, by storage reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PhotoRef {
    pub filename: String,
    pub url: String,
}

impl PhotoRef {
    /// Builds a reference from a public URL, taking the last path segment as
    /// the filename.
    pub fn from_url(url: &str) -> Self {
        let filename = url.rsplit('/').next().unwrap_or(url).to_string();
        Self {
            filename,
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub categories: Vec<String>,
    pub speaker: String,
    pub title: String,
    pub summary: String,
    pub status: DiaryStatus,
    pub photos: Vec<PhotoRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a diary's append-only conversation log.
#[derive(Debug, Clone, Serialize)]
pub struct DiaryTurn {
    pub role: String,
    pub content: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A partial diary update. Only fields that are `Some` are applied; the
/// conversation log and session state are never touched through this path.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct DiaryPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub status: Option<DiaryStatus>,
    pub photos: Option<Vec<PhotoRef>>,
    pub categories: Option<Vec<String>>,
}

impl DiaryPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.summary.is_none()
            && self.status.is_none()
            && self.photos.is_none()
            && self.categories.is_none()
    }
}

//=========================================================================================
// Shop
//=========================================================================================

/// Immutable catalog data for one purchasable cosmetic.
#[derive(Debug, Clone, Serialize)]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub category: String,
}

//=========================================================================================
// Media
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    Uploading,
    Completed,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Uploading => "uploading",
            MediaStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploading" => Some(MediaStatus::Uploading),
            "completed" => Some(MediaStatus::Completed),
            _ => None,
        }
    }
}

/// An uploaded media object. Rows are pre-inserted as `Uploading` and only
/// flipped to `Completed` once the bytes are in object storage.
#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub url: Option<String>,
    pub description: String,
    pub status: MediaStatus,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Audio
//=========================================================================================

/// Format tag for synthesized speech, mapped to a content type at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }
}

/// Synthesized speech bytes plus their format tag.
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}
