//! crates/momentbox_core/src/diary.rs
//!
//! The diary aggregate: creation, the append-only conversation log, and the
//! one-shot summary generation that turns a finished conversation into a
//! titled diary entry.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Diary, DiaryPatch, DiaryStatus, DiaryTurn, PhotoRef};
use crate::ports::{CoachModelService, DatabaseService, PortError, PortResult};

/// One-shot instruction for turning a coach conversation into a diary entry.
/// The reply must carry the `[TITLE]` / `[DIARY]` markers the parser expects.
const DIARY_PROMPT: &str = "You are a warm diary-writing assistant. Read the \
conversation below and write a first-person diary entry on the user's behalf. \
Keep the user's tone and stick to what was actually said. Respond in exactly \
this format:\n[TITLE]\n<a short title>\n[DIARY]\n<the diary entry>";

const DEFAULT_DIARY_TITLE: &str = "Today's Diary";

/// Result of summary generation, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDiary {
    pub title: String,
    pub summary: String,
    pub photos: Vec<PhotoRef>,
}

/// Splits a model reply on the `[TITLE]` / `[DIARY]` markers. When the reply
/// does not follow the format, the whole text becomes the body under a
/// default title rather than failing the request.
pub fn parse_generated_diary(full_text: &str) -> (String, String) {
    let text = full_text.trim();
    if let Some(after_title) = text.strip_prefix("[TITLE]") {
        if let Some((title, body)) = after_title.split_once("[DIARY]") {
            let title = title.trim();
            if !title.is_empty() {
                return (title.to_string(), body.trim().to_string());
            }
        }
    }
    (DEFAULT_DIARY_TITLE.to_string(), text.to_string())
}

fn transcript(turns: &[DiaryTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct DiaryEngine {
    db: Arc<dyn DatabaseService>,
    model: Arc<dyn CoachModelService>,
}

impl DiaryEngine {
    pub fn new(db: Arc<dyn DatabaseService>, model: Arc<dyn CoachModelService>) -> Self {
        Self { db, model }
    }

    /// Opens a new ongoing diary for the given category tags and speaker.
    pub async fn create_diary(
        &self,
        user_id: Uuid,
        categories: Vec<String>,
        speaker: String,
    ) -> PortResult<Diary> {
        let now = Utc::now();
        let diary = Diary {
            id: Uuid::new_v4(),
            user_id,
            categories,
            speaker,
            title: String::new(),
            summary: String::new(),
            status: DiaryStatus::Ongoing,
            photos: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_diary(&diary).await?;
        info!(user = %user_id, diary = %diary.id, "diary opened");
        Ok(diary)
    }

    /// Generates title and body from the diary's conversation log and marks
    /// the diary completed. Ownership-checked through the keyed lookup.
    pub async fn generate_summary(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
    ) -> PortResult<GeneratedDiary> {
        let diary = self.db.get_diary(user_id, diary_id).await?;
        let turns = self.db.get_diary_turns(diary_id).await?;

        let prompt = format!(
            "{DIARY_PROMPT}\n\nTags: {:?}\nConversation:\n{}",
            diary.categories,
            transcript(&turns),
        );
        let reply = self.model.generate(&prompt).await?;
        let (title, summary) = parse_generated_diary(&reply);

        let patch = DiaryPatch {
            title: Some(title.clone()),
            summary: Some(summary.clone()),
            status: Some(DiaryStatus::Completed),
            photos: None,
            categories: None,
        };
        self.db.update_diary_fields(user_id, diary_id, &patch).await?;
        info!(user = %user_id, diary = %diary_id, "diary summary generated");

        Ok(GeneratedDiary {
            title,
            summary,
            photos: diary.photos,
        })
    }

    /// Applies a partial edit to an owned diary. An empty patch is rejected
    /// before touching the store.
    pub async fn update_diary(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
        patch: DiaryPatch,
    ) -> PortResult<Diary> {
        if patch.is_empty() {
            return Err(PortError::Validation(
                "no diary fields to update".to_string(),
            ));
        }
        self.db.update_diary_fields(user_id, diary_id, &patch).await?;
        self.db.get_diary(user_id, diary_id).await
    }

    /// Completed diaries, optionally narrowed by a case-insensitive search
    /// over title and categories and/or to a single calendar day.
    pub async fn list_diaries(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        on_date: Option<NaiveDate>,
    ) -> PortResult<Vec<Diary>> {
        self.db.list_diaries(user_id, search, on_date).await
    }

    pub async fn get_diary(&self, user_id: Uuid, diary_id: Uuid) -> PortResult<Diary> {
        self.db.get_diary(user_id, diary_id).await
    }

    /// Completed diaries that have photos, newest first.
    pub async fn gallery(&self, user_id: Uuid) -> PortResult<Vec<Diary>> {
        self.db.list_gallery_diaries(user_id).await
    }
}
