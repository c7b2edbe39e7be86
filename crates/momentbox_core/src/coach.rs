//! crates/momentbox_core/src/coach.rs
//!
//! The conversation engine that drives the diary coach: general chat,
//! photo-by-photo sessions, and the transition back out of one. State lives
//! in the per-user session row and every turn is mirrored into the diary's
//! conversation log.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::PhotoRef;
use crate::ports::{
    CoachModelService, DatabaseService, ObjectStorageService, PhotoAttachment, PortError,
    PortResult,
};
use crate::session::{
    ChatSession, ChatSessionRecord, ChatTurn, SessionMode, TurnPart, PHOTO_ERROR_MESSAGE,
    PHOTO_PROMPT, PHOTO_WRAP_UP_PROMPT,
};

/// Confirmation returned by `init_general_chat`.
pub const CHAT_STARTED_MESSAGE: &str = "Starting a conversation with your diary coach.";

/// One photo turn as returned to the client. `current_photo` is cleared when
/// the object could not be fetched, and `error` is set when the generative
/// service failed on the image.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoTurnOutcome {
    pub response: String,
    pub current_photo: Option<String>,
    pub is_last_photo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of advancing the photo queue: either the next photo's turn or the
/// wrap-up that hands the session back to general chat.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NextPhotoOutcome {
    Photo(PhotoTurnOutcome),
    Finished { status: &'static str, response: String },
}

fn image_mime(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

pub struct CoachEngine {
    db: Arc<dyn DatabaseService>,
    model: Arc<dyn CoachModelService>,
    storage: Arc<dyn ObjectStorageService>,
}

impl CoachEngine {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        model: Arc<dyn CoachModelService>,
        storage: Arc<dyn ObjectStorageService>,
    ) -> Self {
        Self { db, model, storage }
    }

    /// Resets the user's session to a fresh general chat with the two-turn
    /// seed history.
    pub async fn init_general_chat(&self, user_id: Uuid) -> PortResult<&'static str> {
        let record = self.db.load_chat_session(user_id).await?;
        let session = ChatSession::general_chat();
        self.db
            .save_chat_session(user_id, &session, record.version)
            .await?;
        info!(user = %user_id, "general chat session started");
        Ok(CHAT_STARTED_MESSAGE)
    }

    /// Starts a photo session over the given photo URLs: unions them onto
    /// the diary, resets the session to PhotoSession at index 0, and
    /// produces the first photo turn. An empty list fails before any write.
    pub async fn start_photo_session(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
        photo_urls: Vec<String>,
    ) -> PortResult<PhotoTurnOutcome> {
        if photo_urls.is_empty() {
            return Err(PortError::Validation("no photos selected".to_string()));
        }
        self.db.get_diary(user_id, diary_id).await?;

        let refs: Vec<PhotoRef> = photo_urls.iter().map(|u| PhotoRef::from_url(u)).collect();
        self.db.add_diary_photos(diary_id, &refs).await?;

        let record = self.db.load_chat_session(user_id).await?;
        let mut record = ChatSessionRecord {
            session: ChatSession::photo_session(photo_urls),
            version: record.version,
        };
        self.photo_turn(user_id, diary_id, &mut record).await
    }

    /// Moves to the next photo. While photos remain this is another photo
    /// turn; once the queue is exhausted the session is reseeded as general
    /// chat and the coach produces one closing remark.
    pub async fn advance_photo(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
    ) -> PortResult<NextPhotoOutcome> {
        let mut record = self.db.load_chat_session(user_id).await?;
        if record.session.mode != SessionMode::PhotoSession {
            return Err(PortError::Validation(
                "no photo session in progress".to_string(),
            ));
        }
        self.db.get_diary(user_id, diary_id).await?;

        record.session.current_photo_index += 1;
        if record.session.current_photo().is_some() {
            let outcome = self.photo_turn(user_id, diary_id, &mut record).await?;
            return Ok(NextPhotoOutcome::Photo(outcome));
        }

        // Queue exhausted: back to general chat with a fresh seed, then one
        // closing remark that bridges into the day's conversation.
        let mut session = ChatSession::general_chat();
        let reply = self
            .model
            .chat(&session.history, PHOTO_WRAP_UP_PROMPT)
            .await?;
        session.history.push(ChatTurn::user(PHOTO_WRAP_UP_PROMPT));
        session.history.push(ChatTurn::model(&reply));

        self.db
            .append_diary_turn(diary_id, "ai", &reply, None)
            .await?;
        self.db
            .save_chat_session(user_id, &session, record.version)
            .await?;
        info!(user = %user_id, diary = %diary_id, "photo session finished");

        Ok(NextPhotoOutcome::Finished {
            status: "finished",
            response: reply,
        })
    }

    /// One general-chat exchange: the user's text goes into the diary log
    /// and the full session history, the model replies over that history,
    /// and both sides are persisted.
    pub async fn process_text_input(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
        text: &str,
    ) -> PortResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PortError::Validation("empty input".to_string()));
        }
        let mut record = self.db.load_chat_session(user_id).await?;
        if record.session.history.is_empty() {
            return Err(PortError::Validation(
                "coach session has not been started".to_string(),
            ));
        }
        self.db.get_diary(user_id, diary_id).await?;

        self.db
            .append_diary_turn(diary_id, "user", text, None)
            .await?;

        let reply = self.model.chat(&record.session.history, text).await?;
        record.session.history.push(ChatTurn::user(text));
        record.session.history.push(ChatTurn::model(&reply));

        self.db
            .append_diary_turn(diary_id, "ai", &reply, None)
            .await?;
        self.db
            .save_chat_session(user_id, &record.session, record.version)
            .await?;
        Ok(reply)
    }

    /// Carries out the turn for the session's current photo and persists the
    /// resulting session state under the record's version.
    async fn photo_turn(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
        record: &mut ChatSessionRecord,
    ) -> PortResult<PhotoTurnOutcome> {
        let photo_url = record
            .session
            .current_photo()
            .map(str::to_string)
            .ok_or_else(|| PortError::Validation("no current photo".to_string()))?;
        let is_last_photo = record.session.is_last_photo();

        // A missing object is not fatal: the coach explains and suggests
        // moving on, and the response clears the photo reference.
        let (prompt, attachment, current_photo) = match self.storage.fetch(&photo_url).await {
            Ok(bytes) => (
                PHOTO_PROMPT.to_string(),
                Some(PhotoAttachment {
                    bytes,
                    mime_type: image_mime(&photo_url).to_string(),
                }),
                Some(photo_url.clone()),
            ),
            Err(PortError::NotFound(_)) => {
                let filename = photo_url.rsplit('/').next().unwrap_or(&photo_url);
                warn!(user = %user_id, photo = %photo_url, "photo missing from storage");
                (
                    format!(
                        "System message: the user tried to talk about the photo \
                         '{filename}', but the file could not be found in storage. \
                         Tell the user this photo cannot be loaded and suggest \
                         moving on to the next one."
                    ),
                    None,
                    None,
                )
            }
            Err(other) => return Err(other),
        };

        // Persist the session shape (mode, queue, index) before the model
        // call: a flagged failure must still leave the client positioned on
        // this photo so the next advance moves on instead of retrying.
        let mut user_turn = ChatTurn::user(prompt.as_str());
        if current_photo.is_some() {
            user_turn.parts.push(TurnPart::blob(&photo_url));
        }
        record.session.history = vec![user_turn];
        record.version = self
            .db
            .save_chat_session(user_id, &record.session, record.version)
            .await?;

        match self.model.photo_turn(&prompt, attachment).await {
            Ok(reply) => {
                self.db
                    .append_diary_turn(diary_id, "ai", &reply, current_photo.as_deref())
                    .await?;

                record.session.history.push(ChatTurn::model(&reply));
                record.version = self
                    .db
                    .save_chat_session(user_id, &record.session, record.version)
                    .await?;

                Ok(PhotoTurnOutcome {
                    response: reply,
                    current_photo,
                    is_last_photo,
                    error: None,
                })
            }
            Err(PortError::Upstream(reason)) => {
                warn!(user = %user_id, %reason, "generative service failed on photo turn");
                self.db
                    .append_diary_turn(
                        diary_id,
                        "ai",
                        PHOTO_ERROR_MESSAGE,
                        current_photo.as_deref(),
                    )
                    .await?;
                Ok(PhotoTurnOutcome {
                    response: PHOTO_ERROR_MESSAGE.to_string(),
                    current_photo,
                    is_last_photo,
                    error: Some("ImageProcessingError".to_string()),
                })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDb, MockModel, MockStorage};
    use crate::session::seed_history;
    use std::sync::atomic::Ordering;

    fn engine() -> (CoachEngine, Arc<MockDb>, Arc<MockModel>, Arc<MockStorage>) {
        let db = Arc::new(MockDb::default());
        let model = Arc::new(MockModel::default());
        let storage = Arc::new(MockStorage::default());
        (
            CoachEngine::new(db.clone(), model.clone(), storage.clone()),
            db,
            model,
            storage,
        )
    }

    #[tokio::test]
    async fn init_seeds_a_general_chat_session() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);

        let message = coach.init_general_chat(user_id).await.unwrap();
        assert_eq!(message, CHAT_STARTED_MESSAGE);

        let record = db.load_chat_session(user_id).await.unwrap();
        assert_eq!(record.session.mode, SessionMode::GeneralChat);
        assert_eq!(record.session.history, seed_history());
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn empty_photo_list_fails_without_writes() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);

        let err = coach
            .start_photo_session(user_id, diary_id, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert!(db.get_diary(user_id, diary_id).await.unwrap().photos.is_empty());
    }

    #[tokio::test]
    async fn photo_session_unions_photos_and_produces_first_turn() {
        let (coach, db, _, storage) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        storage.put("https://cdn.example.com/u/a.jpg", b"jpegbytes");

        let outcome = coach
            .start_photo_session(
                user_id,
                diary_id,
                vec!["https://cdn.example.com/u/a.jpg".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.current_photo.as_deref(),
            Some("https://cdn.example.com/u/a.jpg")
        );
        assert!(outcome.is_last_photo);
        assert!(outcome.error.is_none());

        let diary = db.get_diary(user_id, diary_id).await.unwrap();
        assert_eq!(diary.photos.len(), 1);
        assert_eq!(diary.photos[0].filename, "a.jpg");

        let turns = db.turns_for(diary_id);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, "ai");
    }

    #[tokio::test]
    async fn missing_photo_clears_reference_but_still_replies() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);

        let outcome = coach
            .start_photo_session(user_id, diary_id, vec!["mock://gone.jpg".to_string()])
            .await
            .unwrap();

        assert!(outcome.current_photo.is_none());
        assert!(outcome.error.is_none());
        let turns = db.turns_for(diary_id);
        assert_eq!(turns.len(), 1);
        assert!(turns[0].photo_url.is_none());
    }

    #[tokio::test]
    async fn model_failure_logs_apology_and_flags_error() {
        let (coach, db, model, storage) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        storage.put("mock://a.jpg", b"bytes");
        model.fail_photo_turns.store(true, Ordering::SeqCst);

        let outcome = coach
            .start_photo_session(user_id, diary_id, vec!["mock://a.jpg".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.error.as_deref(), Some("ImageProcessingError"));
        assert_eq!(outcome.response, PHOTO_ERROR_MESSAGE);
        let turns = db.turns_for(diary_id);
        assert_eq!(turns[0].content, PHOTO_ERROR_MESSAGE);

        // The session itself survives the failure at its position, so the
        // client can still move on.
        let record = db.load_chat_session(user_id).await.unwrap();
        assert_eq!(record.session.mode, SessionMode::PhotoSession);
        assert_eq!(record.session.current_photo_index, 0);

        let outcome = coach.advance_photo(user_id, diary_id).await.unwrap();
        match outcome {
            NextPhotoOutcome::Finished { status, .. } => assert_eq!(status, "finished"),
            NextPhotoOutcome::Photo(_) => panic!("expected wrap-up"),
        }
    }

    #[tokio::test]
    async fn flagged_errors_still_walk_through_the_queue() {
        let (coach, db, model, storage) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        storage.put("mock://1.jpg", b"one");
        storage.put("mock://2.jpg", b"two");
        model.fail_photo_turns.store(true, Ordering::SeqCst);

        let first = coach
            .start_photo_session(
                user_id,
                diary_id,
                vec!["mock://1.jpg".to_string(), "mock://2.jpg".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(first.error.as_deref(), Some("ImageProcessingError"));

        let second = coach.advance_photo(user_id, diary_id).await.unwrap();
        match second {
            NextPhotoOutcome::Photo(turn) => {
                assert_eq!(turn.current_photo.as_deref(), Some("mock://2.jpg"));
                assert!(turn.is_last_photo);
            }
            NextPhotoOutcome::Finished { .. } => panic!("expected second photo"),
        }

        let third = coach.advance_photo(user_id, diary_id).await.unwrap();
        assert!(matches!(third, NextPhotoOutcome::Finished { .. }));
        let record = db.load_chat_session(user_id).await.unwrap();
        assert_eq!(record.session.mode, SessionMode::GeneralChat);
    }

    #[tokio::test]
    async fn exhausted_queue_returns_to_general_chat() {
        let (coach, db, _, storage) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        storage.put("mock://only.jpg", b"bytes");

        coach
            .start_photo_session(user_id, diary_id, vec!["mock://only.jpg".to_string()])
            .await
            .unwrap();
        let outcome = coach.advance_photo(user_id, diary_id).await.unwrap();

        match outcome {
            NextPhotoOutcome::Finished { status, .. } => assert_eq!(status, "finished"),
            NextPhotoOutcome::Photo(_) => panic!("expected wrap-up"),
        }
        let record = db.load_chat_session(user_id).await.unwrap();
        assert_eq!(record.session.mode, SessionMode::GeneralChat);
        assert_eq!(record.session.current_photo_index, -1);
        // first photo turn + closing remark
        assert_eq!(db.turns_for(diary_id).len(), 2);
    }

    #[tokio::test]
    async fn advance_walks_through_the_queue() {
        let (coach, db, _, storage) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        storage.put("mock://1.jpg", b"one");
        storage.put("mock://2.jpg", b"two");

        let first = coach
            .start_photo_session(
                user_id,
                diary_id,
                vec!["mock://1.jpg".to_string(), "mock://2.jpg".to_string()],
            )
            .await
            .unwrap();
        assert!(!first.is_last_photo);

        let second = coach.advance_photo(user_id, diary_id).await.unwrap();
        match second {
            NextPhotoOutcome::Photo(turn) => {
                assert_eq!(turn.current_photo.as_deref(), Some("mock://2.jpg"));
                assert!(turn.is_last_photo);
            }
            NextPhotoOutcome::Finished { .. } => panic!("expected second photo"),
        }
    }

    #[tokio::test]
    async fn advance_without_photo_session_is_rejected() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        coach.init_general_chat(user_id).await.unwrap();

        let err = coach.advance_photo(user_id, diary_id).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn text_input_requires_a_started_session() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);

        let err = coach
            .process_text_input(user_id, diary_id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn text_exchange_logs_both_sides_and_grows_history() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        coach.init_general_chat(user_id).await.unwrap();

        let reply = coach
            .process_text_input(user_id, diary_id, "I went hiking today")
            .await
            .unwrap();
        assert!(reply.contains("I went hiking today"));

        let turns = db.turns_for(diary_id);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[1].role, "ai");

        let record = db.load_chat_session(user_id).await.unwrap();
        // seed (2) + user + model
        assert_eq!(record.session.history.len(), 4);
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);
        let diary_id = db.seed_diary(user_id);
        coach.init_general_chat(user_id).await.unwrap();

        let err = coach
            .process_text_input(user_id, diary_id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn stale_session_save_conflicts() {
        let (coach, db, _, _) = engine();
        let user_id = db.seed_user(0);
        coach.init_general_chat(user_id).await.unwrap();

        let stale = db.load_chat_session(user_id).await.unwrap();
        // another writer bumps the version
        db.save_chat_session(user_id, &stale.session, stale.version)
            .await
            .unwrap();

        let err = db
            .save_chat_session(user_id, &stale.session, stale.version)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }
}
