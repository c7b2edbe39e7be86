//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use momentbox_core::domain::{
    Appliance, ApplianceKind, Diary, DiaryPatch, DiaryStatus, DiaryTurn, MediaItem, MediaStatus,
    PhotoRef, QuestStatus, RunState, User, UserCredentials, UserQuest, UserView,
};
use momentbox_core::ports::{DatabaseService, PortError, PortResult};
use momentbox_core::session::{normalize_history, ChatSession, ChatSessionRecord, SessionMode};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, QueryBuilder, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// UTC bounds of one calendar day at UTC+9, the same offset the weekly quest
/// window is anchored on. Diary date filters must not drift with the
/// database server's timezone.
fn day_bounds_utc(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc() - Duration::hours(9);
    (start, start + Duration::hours(24))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserViewRecord {
    user_id: Uuid,
    email: String,
    points: i64,
    closet: Json<Vec<String>>,
    equipped_items: Json<BTreeMap<String, String>>,
}
impl UserViewRecord {
    fn to_domain(self) -> UserView {
        UserView {
            user_id: self.user_id,
            email: Some(self.email),
            points: self.points,
            closet: self.closet.0,
            equipped_items: self.equipped_items.0,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ApplianceRecord {
    user_id: Uuid,
    name: String,
    kind: String,
    model_name: String,
    category: String,
    power: bool,
    status: Option<String>,
    course: Option<String>,
    courses: Json<Vec<String>>,
    course_times: Json<BTreeMap<String, i64>>,
    mode: Option<String>,
    modes: Json<Vec<String>>,
    fan_speed: Option<String>,
    fan_speeds: Json<Vec<String>>,
    temperature: Option<i32>,
    total_time_sec: i64,
    remaining_time_sec: i64,
    run_count: i64,
    weekly_duration_sec: i64,
    power_on_at: Option<DateTime<Utc>>,
    cycle_started_at: Option<DateTime<Utc>>,
}
impl ApplianceRecord {
    fn to_domain(self) -> PortResult<Appliance> {
        let kind = ApplianceKind::parse(&self.kind)
            .ok_or_else(|| PortError::Unexpected(format!("unknown appliance kind {}", self.kind)))?;
        let status = match self.status {
            Some(s) => Some(RunState::parse(&s).ok_or_else(|| {
                PortError::Unexpected(format!("unknown appliance status {s}"))
            })?),
            None => None,
        };
        Ok(Appliance {
            user_id: self.user_id,
            name: self.name,
            kind,
            model_name: self.model_name,
            category: self.category,
            power: self.power,
            status,
            course: self.course,
            courses: self.courses.0,
            course_times: self.course_times.0,
            mode: self.mode,
            modes: self.modes.0,
            fan_speed: self.fan_speed,
            fan_speeds: self.fan_speeds.0,
            temperature: self.temperature,
            total_time_sec: self.total_time_sec,
            remaining_time_sec: self.remaining_time_sec,
            run_count: self.run_count,
            weekly_duration_sec: self.weekly_duration_sec,
            power_on_at: self.power_on_at,
            cycle_started_at: self.cycle_started_at,
        })
    }
}

#[derive(FromRow)]
struct UserQuestRecord {
    user_id: Uuid,
    quest_id: Uuid,
    week_start: DateTime<Utc>,
    progress: f64,
    status: String,
    claimed: bool,
    assigned_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    claimed_at: Option<DateTime<Utc>>,
}
impl UserQuestRecord {
    fn to_domain(self) -> PortResult<UserQuest> {
        let status = QuestStatus::parse(&self.status)
            .ok_or_else(|| PortError::Unexpected(format!("unknown quest status {}", self.status)))?;
        Ok(UserQuest {
            user_id: self.user_id,
            quest_id: self.quest_id,
            week_start: self.week_start,
            progress: self.progress,
            status,
            claimed: self.claimed,
            assigned_at: self.assigned_at,
            completed_at: self.completed_at,
            claimed_at: self.claimed_at,
        })
    }
}

#[derive(FromRow)]
struct DiaryRecord {
    id: Uuid,
    user_id: Uuid,
    categories: Json<Vec<String>>,
    speaker: String,
    title: String,
    summary: String,
    status: String,
    photos: Json<Vec<PhotoRef>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl DiaryRecord {
    fn to_domain(self) -> PortResult<Diary> {
        let status = DiaryStatus::parse(&self.status)
            .ok_or_else(|| PortError::Unexpected(format!("unknown diary status {}", self.status)))?;
        Ok(Diary {
            id: self.id,
            user_id: self.user_id,
            categories: self.categories.0,
            speaker: self.speaker,
            title: self.title,
            summary: self.summary,
            status,
            photos: self.photos.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DiaryTurnRecord {
    role: String,
    content: String,
    photo_url: Option<String>,
    created_at: DateTime<Utc>,
}
impl DiaryTurnRecord {
    fn to_domain(self) -> DiaryTurn {
        DiaryTurn {
            role: self.role,
            content: self.content,
            photo_url: self.photo_url,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MediaRecord {
    id: Uuid,
    user_id: Uuid,
    filename: String,
    url: Option<String>,
    description: String,
    status: String,
    created_at: DateTime<Utc>,
}
impl MediaRecord {
    fn to_domain(self) -> PortResult<MediaItem> {
        let status = MediaStatus::parse(&self.status)
            .ok_or_else(|| PortError::Unexpected(format!("unknown media status {}", self.status)))?;
        Ok(MediaItem {
            id: self.id,
            user_id: self.user_id,
            filename: self.filename,
            url: self.url,
            description: self.description,
            status,
            created_at: self.created_at,
        })
    }
}

const DIARY_COLUMNS: &str =
    "id, user_id, categories, speaker, title, summary, status, photos, created_at, updated_at";

const APPLIANCE_COLUMNS: &str = "user_id, name, kind, model_name, category, power, status, course, \
     courses, course_times, mode, modes, fan_speed, fan_speeds, temperature, total_time_sec, \
     remaining_time_sec, run_count, weekly_duration_sec, power_on_at, cycle_started_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        starting_points: i64,
    ) -> PortResult<User> {
        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (user_id, email, hashed_password, points) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(email)
        .bind(hashed_password)
        .bind(starting_points)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("email {email} is already registered"))
            }
            _ => unexpected(e),
        })?;

        Ok(User {
            user_id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {email} not found")),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_view(&self, user_id: Uuid) -> PortResult<UserView> {
        let record = sqlx::query_as::<_, UserViewRecord>(
            "SELECT user_id, email, points, closet, equipped_items FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {user_id} not found")),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (session_id, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row = sqlx::query(
            "SELECT user_id FROM auth_sessions WHERE session_id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match row {
            Some(row) => row.try_get("user_id").map_err(unexpected),
            None => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn purchase_item(&self, user_id: Uuid, item_id: &str, price: i64) -> PortResult<bool> {
        // The balance check is part of the UPDATE predicate, so a concurrent
        // purchase cannot drive the balance negative.
        let result = sqlx::query(
            "UPDATE users SET points = points - $3, closet = closet || to_jsonb($2::text) \
             WHERE user_id = $1 AND points >= $3",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(price)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn equip_item(&self, user_id: Uuid, category: &str, item_id: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET equipped_items = jsonb_set(equipped_items, ARRAY[$2], to_jsonb($3::text)) \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(category)
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {user_id} not found")));
        }
        Ok(())
    }

    async fn credit_points(&self, user_id: Uuid, amount: i64) -> PortResult<i64> {
        let row = sqlx::query(
            "UPDATE users SET points = points + $2 WHERE user_id = $1 RETURNING points",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {user_id} not found")),
            _ => unexpected(e),
        })?;
        row.try_get("points").map_err(unexpected)
    }

    async fn list_appliances(&self, user_id: Uuid) -> PortResult<Vec<Appliance>> {
        let records = sqlx::query_as::<_, ApplianceRecord>(&format!(
            "SELECT {APPLIANCE_COLUMNS} FROM appliances WHERE user_id = $1 ORDER BY name"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_appliance(&self, user_id: Uuid, name: &str) -> PortResult<Appliance> {
        let record = sqlx::query_as::<_, ApplianceRecord>(&format!(
            "SELECT {APPLIANCE_COLUMNS} FROM appliances WHERE user_id = $1 AND name = $2"
        ))
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Appliance '{name}' not found"))
            }
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn insert_appliance(&self, appliance: &Appliance) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO appliances (user_id, name, kind, model_name, category, power, status, \
             course, courses, course_times, mode, modes, fan_speed, fan_speeds, temperature, \
             total_time_sec, remaining_time_sec, run_count, weekly_duration_sec, power_on_at, \
             cycle_started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21)",
        )
        .bind(appliance.user_id)
        .bind(&appliance.name)
        .bind(appliance.kind.as_str())
        .bind(&appliance.model_name)
        .bind(&appliance.category)
        .bind(appliance.power)
        .bind(appliance.status.map(|s| s.as_str()))
        .bind(&appliance.course)
        .bind(Json(&appliance.courses))
        .bind(Json(&appliance.course_times))
        .bind(&appliance.mode)
        .bind(Json(&appliance.modes))
        .bind(&appliance.fan_speed)
        .bind(Json(&appliance.fan_speeds))
        .bind(appliance.temperature)
        .bind(appliance.total_time_sec)
        .bind(appliance.remaining_time_sec)
        .bind(appliance.run_count)
        .bind(appliance.weekly_duration_sec)
        .bind(appliance.power_on_at)
        .bind(appliance.cycle_started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Conflict(format!(
                "appliance '{}' already exists",
                appliance.name
            )),
            _ => unexpected(e),
        })?;
        Ok(())
    }

    async fn save_appliance(&self, appliance: &Appliance) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE appliances SET power = $3, status = $4, course = $5, mode = $6, \
             fan_speed = $7, temperature = $8, total_time_sec = $9, remaining_time_sec = $10, \
             run_count = $11, weekly_duration_sec = $12, power_on_at = $13, cycle_started_at = $14 \
             WHERE user_id = $1 AND name = $2",
        )
        .bind(appliance.user_id)
        .bind(&appliance.name)
        .bind(appliance.power)
        .bind(appliance.status.map(|s| s.as_str()))
        .bind(&appliance.course)
        .bind(&appliance.mode)
        .bind(&appliance.fan_speed)
        .bind(appliance.temperature)
        .bind(appliance.total_time_sec)
        .bind(appliance.remaining_time_sec)
        .bind(appliance.run_count)
        .bind(appliance.weekly_duration_sec)
        .bind(appliance.power_on_at)
        .bind(appliance.cycle_started_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Appliance '{}' not found",
                appliance.name
            )));
        }
        Ok(())
    }

    async fn delete_appliance(&self, user_id: Uuid, name: &str) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM appliances WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_weekly_durations(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE appliances SET weekly_duration_sec = 0 WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn sum_weekly_duration(&self, user_id: Uuid, kind: ApplianceKind) -> PortResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(weekly_duration_sec), 0) FROM appliances \
             WHERE user_id = $1 AND kind = $2",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(total)
    }

    async fn get_user_quest(&self, user_id: Uuid, quest_id: Uuid) -> PortResult<Option<UserQuest>> {
        let record = sqlx::query_as::<_, UserQuestRecord>(
            "SELECT user_id, quest_id, week_start, progress, status, claimed, assigned_at, \
             completed_at, claimed_at FROM user_quests WHERE user_id = $1 AND quest_id = $2",
        )
        .bind(user_id)
        .bind(quest_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(|r| r.to_domain()).transpose()
    }

    async fn insert_user_quest(&self, user_quest: &UserQuest) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_quests (user_id, quest_id, week_start, progress, status, claimed, \
             assigned_at, completed_at, claimed_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (user_id, quest_id) DO NOTHING",
        )
        .bind(user_quest.user_id)
        .bind(user_quest.quest_id)
        .bind(user_quest.week_start)
        .bind(user_quest.progress)
        .bind(user_quest.status.as_str())
        .bind(user_quest.claimed)
        .bind(user_quest.assigned_at)
        .bind(user_quest.completed_at)
        .bind(user_quest.claimed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn save_user_quest(&self, user_quest: &UserQuest) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE user_quests SET progress = $3, status = $4, completed_at = $5 \
             WHERE user_id = $1 AND quest_id = $2",
        )
        .bind(user_quest.user_id)
        .bind(user_quest.quest_id)
        .bind(user_quest.progress)
        .bind(user_quest.status.as_str())
        .bind(user_quest.completed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Quest progress {} not found",
                user_quest.quest_id
            )));
        }
        Ok(())
    }

    async fn delete_stale_user_quests(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM user_quests WHERE user_id = $1 AND week_start < $2")
            .bind(user_id)
            .bind(week_start)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn claim_user_quest(
        &self,
        user_id: Uuid,
        quest_id: Uuid,
        claimed_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        // Single conditional update: only a completed, unclaimed record can
        // flip, so concurrent claims settle at most once.
        let result = sqlx::query(
            "UPDATE user_quests SET claimed = TRUE, claimed_at = $3 \
             WHERE user_id = $1 AND quest_id = $2 AND status = 'completed' AND claimed = FALSE",
        )
        .bind(user_id)
        .bind(quest_id)
        .bind(claimed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_diary(&self, diary: &Diary) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO diaries (id, user_id, categories, speaker, title, summary, status, \
             photos, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(diary.id)
        .bind(diary.user_id)
        .bind(Json(&diary.categories))
        .bind(&diary.speaker)
        .bind(&diary.title)
        .bind(&diary.summary)
        .bind(diary.status.as_str())
        .bind(Json(&diary.photos))
        .bind(diary.created_at)
        .bind(diary.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_diary(&self, user_id: Uuid, diary_id: Uuid) -> PortResult<Diary> {
        let record = sqlx::query_as::<_, DiaryRecord>(&format!(
            "SELECT {DIARY_COLUMNS} FROM diaries WHERE id = $1 AND user_id = $2"
        ))
        .bind(diary_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Diary {diary_id} not found")),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn list_diaries(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        on_date: Option<NaiveDate>,
    ) -> PortResult<Vec<Diary>> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {DIARY_COLUMNS} FROM diaries WHERE user_id = "
        ));
        builder.push_bind(user_id);
        builder.push(" AND status = 'completed'");
        if let Some(term) = search {
            let pattern = format!("%{term}%");
            builder.push(" AND (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR categories::text ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(date) = on_date {
            let (day_start, day_end) = day_bounds_utc(date);
            builder.push(" AND created_at >= ");
            builder.push_bind(day_start);
            builder.push(" AND created_at < ");
            builder.push_bind(day_end);
        }
        builder.push(" ORDER BY created_at DESC");

        let records = builder
            .build_query_as::<DiaryRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_gallery_diaries(&self, user_id: Uuid) -> PortResult<Vec<Diary>> {
        let records = sqlx::query_as::<_, DiaryRecord>(&format!(
            "SELECT {DIARY_COLUMNS} FROM diaries WHERE user_id = $1 AND status = 'completed' \
             AND jsonb_array_length(photos) > 0 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn append_diary_turn(
        &self,
        diary_id: Uuid,
        role: &str,
        content: &str,
        photo_url: Option<&str>,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query(
            "INSERT INTO diary_turns (diary_id, role, content, photo_url) VALUES ($1, $2, $3, $4)",
        )
        .bind(diary_id)
        .bind(role)
        .bind(content)
        .bind(photo_url)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        sqlx::query("UPDATE diaries SET updated_at = now() WHERE id = $1")
            .bind(diary_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn get_diary_turns(&self, diary_id: Uuid) -> PortResult<Vec<DiaryTurn>> {
        let records = sqlx::query_as::<_, DiaryTurnRecord>(
            "SELECT role, content, photo_url, created_at FROM diary_turns \
             WHERE diary_id = $1 ORDER BY id",
        )
        .bind(diary_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn add_diary_photos(&self, diary_id: Uuid, photos: &[PhotoRef]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let row = sqlx::query("SELECT photos FROM diaries WHERE id = $1 FOR UPDATE")
            .bind(diary_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Diary {diary_id} not found")))?;
        let Json(mut existing): Json<Vec<PhotoRef>> = row.try_get("photos").map_err(unexpected)?;

        for photo in photos {
            if !existing.contains(photo) {
                existing.push(photo.clone());
            }
        }

        sqlx::query("UPDATE diaries SET photos = $2, updated_at = now() WHERE id = $1")
            .bind(diary_id)
            .bind(Json(&existing))
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn update_diary_fields(
        &self,
        user_id: Uuid,
        diary_id: Uuid,
        patch: &DiaryPatch,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE diaries SET \
             title = COALESCE($3, title), \
             summary = COALESCE($4, summary), \
             status = COALESCE($5, status), \
             photos = COALESCE($6, photos), \
             categories = COALESCE($7, categories), \
             updated_at = now() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(diary_id)
        .bind(user_id)
        .bind(&patch.title)
        .bind(&patch.summary)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.photos.as_ref().map(Json))
        .bind(patch.categories.as_ref().map(Json))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Diary {diary_id} not found")));
        }
        Ok(())
    }

    async fn load_chat_session(&self, user_id: Uuid) -> PortResult<ChatSessionRecord> {
        let row = sqlx::query("SELECT session, version FROM chat_sessions WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        let Some(row) = row else {
            return Ok(ChatSessionRecord::default());
        };
        let Json(raw): Json<serde_json::Value> = row.try_get("session").map_err(unexpected)?;
        let version: i64 = row.try_get("version").map_err(unexpected)?;

        // Histories written by older clients may use looser shapes, so the
        // session document is re-normalized on every load.
        let mode = raw
            .get("mode")
            .and_then(|m| m.as_str())
            .and_then(SessionMode::parse)
            .unwrap_or(SessionMode::Idle);
        let history = raw
            .get("history")
            .map(normalize_history)
            .unwrap_or_default();
        let selected_photos = raw
            .get("selected_photos")
            .and_then(|p| p.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let current_photo_index = raw
            .get("current_photo_index")
            .and_then(|i| i.as_i64())
            .unwrap_or(-1) as i32;

        Ok(ChatSessionRecord {
            session: ChatSession {
                mode,
                history,
                selected_photos,
                current_photo_index,
            },
            version,
        })
    }

    async fn save_chat_session(
        &self,
        user_id: Uuid,
        session: &ChatSession,
        expected_version: i64,
    ) -> PortResult<i64> {
        let row = sqlx::query(
            "INSERT INTO chat_sessions (user_id, session, version) VALUES ($1, $2, 1) \
             ON CONFLICT (user_id) DO UPDATE \
             SET session = EXCLUDED.session, version = chat_sessions.version + 1 \
             WHERE chat_sessions.version = $3 \
             RETURNING version",
        )
        .bind(user_id)
        .bind(Json(session))
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match row {
            Some(row) => row.try_get("version").map_err(unexpected),
            None => Err(PortError::Conflict(format!(
                "chat session for {user_id} changed since version {expected_version}"
            ))),
        }
    }

    async fn insert_media(&self, item: &MediaItem) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO media (id, user_id, filename, url, description, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(&item.filename)
        .bind(&item.url)
        .bind(&item.description)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn set_media_completed(&self, media_id: Uuid, url: &str) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE media SET status = 'completed', url = $2 WHERE id = $1")
                .bind(media_id)
                .bind(url)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Media {media_id} not found")));
        }
        Ok(())
    }

    async fn delete_media(&self, user_id: Uuid, media_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM media WHERE id = $1 AND user_id = $2")
            .bind(media_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_media(&self, user_id: Uuid, media_id: Uuid) -> PortResult<MediaItem> {
        let record = sqlx::query_as::<_, MediaRecord>(
            "SELECT id, user_id, filename, url, description, status, created_at FROM media \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(media_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Media {media_id} not found")),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn list_media(&self, user_id: Uuid) -> PortResult<Vec<MediaItem>> {
        let records = sqlx::query_as::<_, MediaRecord>(
            "SELECT id, user_id, filename, url, description, status, created_at FROM media \
             WHERE user_id = $1 AND status = 'completed' ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn diary_day_window_is_anchored_at_utc_plus_9() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let (start, end) = day_bounds_utc(date);

        // Midnight March 10 KST is 15:00 March 9 UTC.
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 9, 15, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap());

        // 23:30 on the KST day falls inside the window; 00:30 the next KST
        // day does not.
        let late = Utc.with_ymd_and_hms(2025, 3, 10, 14, 30, 0).unwrap();
        let next = Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap();
        assert!(start <= late && late < end);
        assert!(next >= end);
    }
}
