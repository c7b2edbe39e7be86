//! crates/momentbox_core/src/mock.rs
//!
//! In-memory test doubles for the ports. Compiled for tests only; the engine
//! tests in `quests`, `shop`, and `coach` all share these.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    Appliance, ApplianceKind, Diary, DiaryPatch, DiaryTurn, MediaItem, PhotoRef, User,
    UserCredentials, UserQuest, UserView,
};
use crate::ports::{
    CoachModelService, DatabaseService, ObjectStorageService, PhotoAttachment, PortError,
    PortResult,
};
use crate::session::{ChatSession, ChatSessionRecord, ChatTurn};

#[derive(Debug, Clone)]
pub struct MockUser {
    pub email: String,
    pub hashed_password: String,
    pub points: i64,
    pub closet: Vec<String>,
    pub equipped: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct MockDb {
    pub users: Mutex<HashMap<Uuid, MockUser>>,
    pub auth_sessions: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
    pub appliances: Mutex<Vec<Appliance>>,
    pub user_quests: Mutex<Vec<UserQuest>>,
    pub diaries: Mutex<Vec<Diary>>,
    pub diary_turns: Mutex<Vec<(Uuid, DiaryTurn)>>,
    pub chat_sessions: Mutex<HashMap<Uuid, ChatSessionRecord>>,
    pub media: Mutex<Vec<MediaItem>>,
}

impl MockDb {
    pub fn seed_user(&self, points: i64) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.lock().unwrap().insert(
            user_id,
            MockUser {
                email: format!("{user_id}@example.com"),
                hashed_password: "hash".to_string(),
                points,
                closet: Vec::new(),
                equipped: BTreeMap::new(),
            },
        );
        user_id
    }

    pub fn points(&self, user_id: Uuid) -> i64 {
        self.users.lock().unwrap()[&user_id].points
    }

    pub fn seed_diary(&self, user_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.diaries.lock().unwrap().push(Diary {
            id,
            user_id,
            categories: vec!["daily".to_string()],
            speaker: "default".to_string(),
            title: String::new(),
            summary: String::new(),
            status: crate::domain::DiaryStatus::Ongoing,
            photos: Vec::new(),
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn turns_for(&self, diary_id: Uuid) -> Vec<DiaryTurn> {
        self.diary_turns
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| *d == diary_id)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl DatabaseService for MockDb {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        starting_points: i64,
    ) -> PortResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == email) {
            return Err(PortError::Conflict("email already exists".to_string()));
        }
        let user_id = Uuid::new_v4();
        users.insert(
            user_id,
            MockUser {
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
                points: starting_points,
                closet: Vec::new(),
                equipped: BTreeMap::new(),
            },
        );
        Ok(User {
            user_id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|(_, u)| u.email == email)
            .map(|(id, u)| UserCredentials {
                user_id: *id,
                email: u.email.clone(),
                hashed_password: u.hashed_password.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("user {email}")))
    }

    async fn get_user_view(&self, user_id: Uuid) -> PortResult<UserView> {
        let users = self.users.lock().unwrap();
        let user = users
            .get(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))?;
        Ok(UserView {
            user_id,
            email: Some(user.email.clone()),
            points: user.points,
            closet: user.closet.clone(),
            equipped_items: user.equipped.clone(),
        })
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.auth_sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let sessions = self.auth_sessions.lock().unwrap();
        match sessions.get(session_id) {
            Some((user_id, expires)) if *expires > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.auth_sessions.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn purchase_item(&self, user_id: Uuid, item_id: &str, price: i64) -> PortResult<bool> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))?;
        if user.points < price {
            return Ok(false);
        }
        user.points -= price;
        user.closet.push(item_id.to_string());
        Ok(true)
    }

    async fn equip_item(&self, user_id: Uuid, category: &str, item_id: &str) -> PortResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))?;
        user.equipped
            .insert(category.to_string(), item_id.to_string());
        Ok(())
    }

    async fn credit_points(&self, user_id: Uuid, amount: i64) -> PortResult<i64> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))?;
        user.points += amount;
        Ok(user.points)
    }

    async fn list_appliances(&self, user_id: Uuid) -> PortResult<Vec<Appliance>> {
        Ok(self
            .appliances
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_appliance(&self, user_id: Uuid, name: &str) -> PortResult<Appliance> {
        self.appliances
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.user_id == user_id && a.name == name)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("appliance {name}")))
    }

    async fn insert_appliance(&self, appliance: &Appliance) -> PortResult<()> {
        let mut appliances = self.appliances.lock().unwrap();
        if appliances
            .iter()
            .any(|a| a.user_id == appliance.user_id && a.name == appliance.name)
        {
            return Err(PortError::Conflict(format!(
                "appliance '{}' already exists",
                appliance.name
            )));
        }
        appliances.push(appliance.clone());
        Ok(())
    }

    async fn save_appliance(&self, appliance: &Appliance) -> PortResult<()> {
        let mut appliances = self.appliances.lock().unwrap();
        let slot = appliances
            .iter_mut()
            .find(|a| a.user_id == appliance.user_id && a.name == appliance.name)
            .ok_or_else(|| PortError::NotFound(format!("appliance {}", appliance.name)))?;
        *slot = appliance.clone();
        Ok(())
    }

    async fn delete_appliance(&self, user_id: Uuid, name: &str) -> PortResult<bool> {
        let mut appliances = self.appliances.lock().unwrap();
        let before = appliances.len();
        appliances.retain(|a| !(a.user_id == user_id && a.name == name));
        Ok(appliances.len() < before)
    }

    async fn reset_weekly_durations(&self, user_id: Uuid) -> PortResult<()> {
        for appliance in self
            .appliances
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|a| a.user_id == user_id)
        {
            appliance.weekly_duration_sec = 0;
        }
        Ok(())
    }

    async fn sum_weekly_duration(&self, user_id: Uuid, kind: ApplianceKind) -> PortResult<i64> {
        Ok(self
            .appliances
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.user_id == user_id && a.kind == kind)
            .map(|a| a.weekly_duration_sec)
            .sum())
    }

    async fn get_user_quest(&self, user_id: Uuid, quest_id: Uuid) -> PortResult<Option<UserQuest>> {
        Ok(self
            .user_quests
            .lock()
            .unwrap()
            .iter()
            .find(|uq| uq.user_id == user_id && uq.quest_id == quest_id)
            .cloned())
    }

    async fn insert_user_quest(&self, user_quest: &UserQuest) -> PortResult<()> {
        self.user_quests.lock().unwrap().push(user_quest.clone());
        Ok(())
    }

    async fn save_user_quest(&self, user_quest: &UserQuest) -> PortResult<()> {
        let mut quests = self.user_quests.lock().unwrap();
        let slot = quests
            .iter_mut()
            .find(|uq| uq.user_id == user_quest.user_id && uq.quest_id == user_quest.quest_id)
            .ok_or_else(|| PortError::NotFound("user quest".to_string()))?;
        *slot = user_quest.clone();
        Ok(())
    }

    async fn delete_stale_user_quests(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<u64> {
        let mut quests = self.user_quests.lock().unwrap();
        let before = quests.len();
        quests.retain(|uq| !(uq.user_id == user_id && uq.week_start < week_start));
        Ok((before - quests.len()) as u64)
    }

    async fn claim_user_quest(
        &self,
        user_id: Uuid,
        quest_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut quests = self.user_quests.lock().unwrap();
        let Some(uq) = quests
            .iter_mut()
            .find(|uq| uq.user_id == user_id && uq.quest_id == quest_id)
        else {
            return Ok(false);
        };
        if uq.status != crate::domain::QuestStatus::Completed || uq.claimed {
            return Ok(false);
        }
        uq.claimed = true;
        uq.claimed_at = Some(claimed_at);
        Ok(true)
    }

    async fn insert_diary(&self, diary: &Diary) -> PortResult<()> {
        self.diaries.lock().unwrap().push(diary.clone());
        Ok(())
    }

    async fn get_diary(&self, user_id: Uuid, diary_id: Uuid) -> PortResult<Diary> {
        self.diaries
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == diary_id && d.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("diary {diary_id}")))
    }

    async fn list_diaries(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        on_date: Option<NaiveDate>,
    ) -> PortResult<Vec<Diary>> {
        let needle = search.map(str::to_lowercase);
        Ok(self
            .diaries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.user_id == user_id)
            .filter(|d| d.status == crate::domain::DiaryStatus::Completed)
            .filter(|d| match &needle {
                Some(n) => {
                    d.title.to_lowercase().contains(n)
                        || d.categories.iter().any(|c| c.to_lowercase().contains(n))
                }
                None => true,
            })
            .filter(|d| match on_date {
                // Same UTC+9 calendar day the quest window uses.
                Some(date) => (d.created_at + chrono::Duration::hours(9)).date_naive() == date,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn list_gallery_diaries(&self, user_id: Uuid) -> PortResult<Vec<Diary>> {
        let mut diaries: Vec<Diary> = self
            .diaries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| {
                d.user_id == user_id
                    && d.status == crate::domain::DiaryStatus::Completed
                    && !d.photos.is_empty()
            })
            .cloned()
            .collect();
        diaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(diaries)
    }

    async fn append_diary_turn(
        &self,
        diary_id: Uuid,
        role: &str,
        content: &str,
        photo_url: Option<&str>,
    ) -> PortResult<()> {
        self.diary_turns.lock().unwrap().push((
            diary_id,
            DiaryTurn {
                role: role.to_string(),
                content: content.to_string(),
                photo_url: photo_url.map(str::to_string),
                created_at: Utc::now(),
            },
        ));
        if let Some(diary) = self
            .diaries
            .lock()
            .unwrap()
            .iter_mut()
            .find(|d| d.id == diary_id)
        {
            diary.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_diary_turns(&self, diary_id: Uuid) -> PortResult<Vec<DiaryTurn>> {
        Ok(self.turns_for(diary_id))
    }

    async fn add_diary_photos(&self, diary_id: Uuid, photos: &[PhotoRef]) -> PortResult<()> {
        let mut diaries = self.diaries.lock().unwrap();
        let diary = diaries
            .iter_mut()
            .find(|d| d.id == diary_id)
            .ok_or_else(|| PortError::NotFound(format!("diary {diary_id}")))?;
        for photo in photos {
            if !diary.photos.contains(photo) {
                diary.photos.push(photo.clone());
            }
        }
        Ok(())
    }

    async fn update_diary_fields(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
        patch: &DiaryPatch,
    ) -> PortResult<()> {
        let mut diaries = self.diaries.lock().unwrap();
        let diary = diaries
            .iter_mut()
            .find(|d| d.id == diary_id && d.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("diary {diary_id}")))?;
        if let Some(title) = &patch.title {
            diary.title = title.clone();
        }
        if let Some(summary) = &patch.summary {
            diary.summary = summary.clone();
        }
        if let Some(status) = patch.status {
            diary.status = status;
        }
        if let Some(photos) = &patch.photos {
            diary.photos = photos.clone();
        }
        if let Some(categories) = &patch.categories {
            diary.categories = categories.clone();
        }
        diary.updated_at = Utc::now();
        Ok(())
    }

    async fn load_chat_session(&self, user_id: Uuid) -> PortResult<ChatSessionRecord> {
        Ok(self
            .chat_sessions
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_chat_session(
        &self,
        user_id: Uuid,
        session: &ChatSession,
        expected_version: i64,
    ) -> PortResult<i64> {
        let mut sessions = self.chat_sessions.lock().unwrap();
        let current = sessions.entry(user_id).or_default();
        if current.version != expected_version {
            return Err(PortError::Conflict(format!(
                "session version {} != expected {}",
                current.version, expected_version
            )));
        }
        current.session = session.clone();
        current.version += 1;
        Ok(current.version)
    }

    async fn insert_media(&self, item: &MediaItem) -> PortResult<()> {
        self.media.lock().unwrap().push(item.clone());
        Ok(())
    }

    async fn set_media_completed(&self, media_id: Uuid, url: &str) -> PortResult<()> {
        let mut media = self.media.lock().unwrap();
        let item = media
            .iter_mut()
            .find(|m| m.id == media_id)
            .ok_or_else(|| PortError::NotFound(format!("media {media_id}")))?;
        item.status = crate::domain::MediaStatus::Completed;
        item.url = Some(url.to_string());
        Ok(())
    }

    async fn delete_media(&self, user_id: Uuid, media_id: Uuid) -> PortResult<bool> {
        let mut media = self.media.lock().unwrap();
        let before = media.len();
        media.retain(|m| !(m.id == media_id && m.user_id == user_id));
        Ok(media.len() < before)
    }

    async fn get_media(&self, user_id: Uuid, media_id: Uuid) -> PortResult<MediaItem> {
        self.media
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == media_id && m.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("media {media_id}")))
    }

    async fn list_media(&self, user_id: Uuid) -> PortResult<Vec<MediaItem>> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }
}

//=========================================================================================
// Model and storage doubles
//=========================================================================================

#[derive(Default)]
pub struct MockModel {
    pub fail_photo_turns: AtomicBool,
    pub generate_reply: Mutex<String>,
    pub last_chat_history_len: Mutex<usize>,
}

#[async_trait]
impl CoachModelService for MockModel {
    async fn chat(&self, history: &[ChatTurn], input: &str) -> PortResult<String> {
        *self.last_chat_history_len.lock().unwrap() = history.len();
        Ok(format!("coach reply to: {input}"))
    }

    async fn photo_turn(
        &self,
        prompt: &str,
        _image: Option<PhotoAttachment>,
    ) -> PortResult<String> {
        if self.fail_photo_turns.load(Ordering::SeqCst) {
            return Err(PortError::Upstream("model overloaded".to_string()));
        }
        Ok(format!("photo reply to: {}", &prompt[..prompt.len().min(24)]))
    }

    async fn generate(&self, _prompt: &str) -> PortResult<String> {
        Ok(self.generate_reply.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MockStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockStorage {
    pub fn put(&self, reference: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(reference.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl ObjectStorageService for MockStorage {
    async fn fetch(&self, reference: &str) -> PortResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| PortError::NotFound(reference.to_string()))
    }

    async fn store(&self, key: &str, bytes: &[u8], _content_type: &str) -> PortResult<String> {
        let url = format!("mock://{key}");
        self.objects.lock().unwrap().insert(url.clone(), bytes.to_vec());
        Ok(url)
    }

    async fn exists(&self, reference: &str) -> PortResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(reference))
    }

    async fn delete(&self, reference: &str) -> PortResult<()> {
        self.objects.lock().unwrap().remove(reference);
        Ok(())
    }
}
