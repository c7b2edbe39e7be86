//! crates/momentbox_core/src/quests.rs
//!
//! The weekly quest engine: a static catalog keyed by the week-start
//! timestamp, per-user progress tracking, and reward settlement.
//!
//! The catalog is generated from a fixed template rather than stored, so
//! there is no mutable catalog to drift and nothing to repair. Quest ids are
//! UUIDv5 digests of `week_start:slug`, which makes them stable across
//! processes for the same week.
//!
//! Settlement happens in exactly one place: `claim_quest`. Completing a
//! quest (via appliance events or a duration recompute) only flips the
//! status; the points are credited when the user claims, guarded by an
//! atomic conditional update in the store.

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{ApplianceKind, GoalType, Quest, QuestStatus, QuestView, UserQuest};
use crate::ports::{DatabaseService, PortError, PortResult};

/// Quests are partitioned by the week as observed in this fixed offset
/// (UTC+9), matching the timezone the client population lives in.
const WEEK_OFFSET_SECS: i32 = 9 * 3600;

/// The start of the current week: Monday 00:00 in the fixed offset,
/// expressed in UTC. This value is the partition key for the catalog and
/// the cutoff for purging stale per-user records.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(WEEK_OFFSET_SECS).expect("valid fixed offset");
    let local = now.with_timezone(&offset);
    let monday = local.date_naive() - Duration::days(local.weekday().num_days_from_monday() as i64);
    let midnight = monday.and_hms_opt(0, 0, 0).expect("midnight exists");
    offset
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offsets have no DST gaps")
        .with_timezone(&Utc)
}

struct QuestTemplate {
    slug: &'static str,
    title: &'static str,
    description: &'static str,
    reward: i64,
    goal: i64,
    goal_type: GoalType,
    kind: ApplianceKind,
}

const QUEST_TEMPLATES: &[QuestTemplate] = &[
    QuestTemplate {
        slug: "washer-2",
        title: "Washer: run twice",
        description: "Run your washer at least 2 times this week.",
        reward: 100,
        goal: 2,
        goal_type: GoalType::Count,
        kind: ApplianceKind::Washer,
    },
    QuestTemplate {
        slug: "styler-3",
        title: "Styler: run three times",
        description: "Run your styler at least 3 times this week.",
        reward: 100,
        goal: 3,
        goal_type: GoalType::Count,
        kind: ApplianceKind::Styler,
    },
    QuestTemplate {
        slug: "dishwasher-4",
        title: "Dishwasher: run four times",
        description: "Run your dishwasher at least 4 times this week.",
        reward: 100,
        goal: 4,
        goal_type: GoalType::Count,
        kind: ApplianceKind::Dishwasher,
    },
    QuestTemplate {
        slug: "vacuum-4",
        title: "Robot vacuum: clean four times",
        description: "Send your robot vacuum out at least 4 times this week.",
        reward: 100,
        goal: 4,
        goal_type: GoalType::Count,
        kind: ApplianceKind::RobotVacuum,
    },
    QuestTemplate {
        slug: "dryer-2",
        title: "Dryer: run twice",
        description: "Run your dryer at least 2 times this week.",
        reward: 100,
        goal: 2,
        goal_type: GoalType::Count,
        kind: ApplianceKind::Dryer,
    },
    QuestTemplate {
        slug: "washer-master-5",
        title: "Washer master: run five times",
        description: "Run your washer at least 5 times this week.",
        reward: 200,
        goal: 5,
        goal_type: GoalType::Count,
        kind: ApplianceKind::Washer,
    },
    QuestTemplate {
        slug: "vacuum-master-7",
        title: "Vacuum master: clean seven times",
        description: "Send your robot vacuum out at least 7 times this week.",
        reward: 200,
        goal: 7,
        goal_type: GoalType::Count,
        kind: ApplianceKind::RobotVacuum,
    },
    QuestTemplate {
        slug: "purifier-10h",
        title: "Fresh air: 10 hours of purifying",
        description: "Keep your air purifier running for 10 hours this week.",
        reward: 150,
        goal: 10,
        goal_type: GoalType::DurationHours,
        kind: ApplianceKind::AirPurifier,
    },
    QuestTemplate {
        slug: "aircon-8h",
        title: "Cool down: 8 hours of air conditioning",
        description: "Run your air conditioner for 8 hours this week.",
        reward: 150,
        goal: 8,
        goal_type: GoalType::DurationHours,
        kind: ApplianceKind::AirConditioner,
    },
];

/// The full catalog for one week. Pure and deterministic.
pub fn weekly_catalog(week: DateTime<Utc>) -> Vec<Quest> {
    QUEST_TEMPLATES
        .iter()
        .map(|t| Quest {
            id: quest_id(week, t.slug),
            slug: t.slug.to_string(),
            title: t.title.to_string(),
            description: t.description.to_string(),
            reward: t.reward,
            goal: t.goal,
            goal_type: t.goal_type,
            appliance_kind: t.kind,
            week_start: week,
        })
        .collect()
}

fn quest_id(week: DateTime<Utc>, slug: &str) -> Uuid {
    let key = format!("{}:{}", week.timestamp(), slug);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

//=========================================================================================
// Engine
//=========================================================================================

#[derive(Clone)]
pub struct QuestEngine {
    db: Arc<dyn DatabaseService>,
}

impl QuestEngine {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Purges the user's quest records from past weeks. Weekly duration
    /// counters are reset only when a rollover actually happened, so a
    /// mid-week read never wipes duration progress.
    pub async fn cleanup_stale_progress(&self, user_id: Uuid) -> PortResult<()> {
        let week = week_start(Utc::now());
        let purged = self.db.delete_stale_user_quests(user_id, week).await?;
        if purged > 0 {
            info!(%user_id, purged, "purged quest records from past weeks");
            self.db.reset_weekly_durations(user_id).await?;
        }
        Ok(())
    }

    /// The merged quest + progress list for the current week, filtered to
    /// appliance kinds the user owns. Missing progress records are created
    /// lazily at zero.
    pub async fn list_user_weekly_quests(&self, user_id: Uuid) -> PortResult<Vec<QuestView>> {
        self.cleanup_stale_progress(user_id).await?;

        let now = Utc::now();
        let week = week_start(now);
        let owned: HashSet<ApplianceKind> = self
            .db
            .list_appliances(user_id)
            .await?
            .into_iter()
            .map(|a| a.kind)
            .collect();
        if owned.is_empty() {
            return Ok(Vec::new());
        }

        let mut views = Vec::new();
        for quest in weekly_catalog(week) {
            if !owned.contains(&quest.appliance_kind) {
                continue;
            }
            let mut user_quest = match self.db.get_user_quest(user_id, quest.id).await? {
                Some(uq) => uq,
                None => {
                    let uq = new_user_quest(user_id, &quest, now);
                    self.db.insert_user_quest(&uq).await?;
                    uq
                }
            };

            // Duration progress is derived from the live appliance sum;
            // count progress is whatever has accumulated.
            if quest.goal_type == GoalType::DurationHours {
                let live_sec = self
                    .db
                    .sum_weekly_duration(user_id, quest.appliance_kind)
                    .await?;
                user_quest.progress = live_sec as f64 / 3600.0;
                if user_quest.status == QuestStatus::InProgress
                    && user_quest.progress >= quest.goal as f64
                {
                    user_quest.status = QuestStatus::Completed;
                    user_quest.completed_at = Some(now);
                    self.db.save_user_quest(&user_quest).await?;
                    info!(%user_id, quest = %quest.slug, "duration quest completed");
                }
            }

            views.push(QuestView {
                quest,
                user_progress: user_quest,
            });
        }
        Ok(views)
    }

    /// Called after an appliance power-off or cycle completion. Advances
    /// every current-week quest matching the appliance's kind. A missing
    /// appliance is a no-op, not an error.
    pub async fn record_appliance_event(&self, user_id: Uuid, appliance_name: &str) -> PortResult<()> {
        let appliance = match self.db.get_appliance(user_id, appliance_name).await {
            Ok(a) => a,
            Err(PortError::NotFound(_)) => {
                debug!(%user_id, appliance_name, "event for unknown appliance ignored");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        let week = week_start(now);
        for quest in weekly_catalog(week)
            .into_iter()
            .filter(|q| q.appliance_kind == appliance.kind)
        {
            let mut user_quest = match self.db.get_user_quest(user_id, quest.id).await? {
                Some(uq) => uq,
                None => {
                    // Device ran before the quest list was ever read.
                    let uq = new_user_quest(user_id, &quest, now);
                    self.db.insert_user_quest(&uq).await?;
                    uq
                }
            };
            if user_quest.status != QuestStatus::InProgress {
                continue;
            }

            match quest.goal_type {
                GoalType::Count => user_quest.progress += 1.0,
                GoalType::DurationHours => {
                    let live_sec = self
                        .db
                        .sum_weekly_duration(user_id, quest.appliance_kind)
                        .await?;
                    user_quest.progress = live_sec as f64 / 3600.0;
                }
            }
            if user_quest.progress >= quest.goal as f64 {
                user_quest.status = QuestStatus::Completed;
                user_quest.completed_at = Some(now);
                info!(%user_id, quest = %quest.slug, "quest completed");
            }
            self.db.save_user_quest(&user_quest).await?;
        }
        Ok(())
    }

    /// Settles one quest's reward. The completed+unclaimed -> claimed
    /// transition is a single conditional update, so two racing claims can
    /// credit at most once. Returns the new points balance.
    pub async fn claim_quest(&self, user_id: Uuid, quest_id: Uuid) -> PortResult<i64> {
        let user_quest = self
            .db
            .get_user_quest(user_id, quest_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("No quest record for {quest_id}")))?;

        if user_quest.claimed {
            return Err(PortError::Validation("Quest already claimed".to_string()));
        }
        if user_quest.status != QuestStatus::Completed {
            return Err(PortError::Validation(
                "Quest is not completed yet".to_string(),
            ));
        }

        let reward = weekly_catalog(user_quest.week_start)
            .into_iter()
            .find(|q| q.id == quest_id)
            .map(|q| q.reward)
            .ok_or_else(|| PortError::NotFound(format!("Quest {quest_id} is not in the catalog")))?;

        let transitioned = self.db.claim_user_quest(user_id, quest_id, Utc::now()).await?;
        if !transitioned {
            // Lost the race to another claim.
            return Err(PortError::Validation("Quest already claimed".to_string()));
        }

        let balance = self.db.credit_points(user_id, reward).await?;
        info!(%user_id, %quest_id, reward, balance, "quest reward settled");
        Ok(balance)
    }
}

fn new_user_quest(user_id: Uuid, quest: &Quest, now: DateTime<Utc>) -> UserQuest {
    UserQuest {
        user_id,
        quest_id: quest.id,
        week_start: quest.week_start,
        progress: 0.0,
        status: QuestStatus::InProgress,
        claimed: false,
        assigned_at: now,
        completed_at: None,
        claimed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appliance::{find_template, simulate_usage};
    use crate::mock::MockDb;
    use chrono::TimeDelta;

    fn engine_with_user() -> (QuestEngine, Arc<MockDb>, Uuid) {
        let db = Arc::new(MockDb::default());
        let user_id = db.seed_user(10_000);
        (QuestEngine::new(db.clone()), db, user_id)
    }

    fn add_appliance(db: &MockDb, user_id: Uuid, template: &str, name: &str) {
        let appliance = find_template(template)
            .unwrap()
            .instantiate(user_id, name, Utc::now());
        db.appliances.lock().unwrap().push(appliance);
    }

    #[test]
    fn week_start_is_monday_midnight_in_fixed_offset() {
        // 2026-08-28 is a Friday; the week began Monday 2026-08-24.
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        let week = week_start(now);
        // Monday 00:00 at UTC+9 is Sunday 15:00 UTC.
        assert_eq!(week, Utc.with_ymd_and_hms(2026, 8, 23, 15, 0, 0).unwrap());
        // Idempotent: the week key of a week key is itself.
        assert_eq!(week_start(week), week);
    }

    #[test]
    fn catalog_ids_are_deterministic_per_week() {
        let week = week_start(Utc::now());
        let a = weekly_catalog(week);
        let b = weekly_catalog(week);
        assert_eq!(a.len(), QUEST_TEMPLATES.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
        }
        let next_week = weekly_catalog(week + TimeDelta::days(7));
        assert_ne!(a[0].id, next_week[0].id);
    }

    #[tokio::test]
    async fn no_appliances_means_no_quests() {
        let (engine, _db, user_id) = engine_with_user();
        let quests = engine.list_user_weekly_quests(user_id).await.unwrap();
        assert!(quests.is_empty());
    }

    #[tokio::test]
    async fn listing_filters_to_owned_kinds_and_creates_zero_progress() {
        let (engine, db, user_id) = engine_with_user();
        add_appliance(&db, user_id, "WASHER_AI", "My Washer");

        let quests = engine.list_user_weekly_quests(user_id).await.unwrap();
        assert_eq!(quests.len(), 2); // washer-2 and washer-master-5
        for view in &quests {
            assert_eq!(view.quest.appliance_kind, ApplianceKind::Washer);
            assert_eq!(view.user_progress.progress, 0.0);
            assert_eq!(view.user_progress.status, QuestStatus::InProgress);
            assert!(!view.user_progress.claimed);
        }
    }

    #[tokio::test]
    async fn count_goal_completes_once_without_crediting() {
        let (engine, db, user_id) = engine_with_user();
        add_appliance(&db, user_id, "WASHER_AI", "My Washer");

        // goal=2 for washer-2; fire three events.
        for _ in 0..3 {
            engine
                .record_appliance_event(user_id, "My Washer")
                .await
                .unwrap();
        }

        let week = week_start(Utc::now());
        let quest_id = quest_id(week, "washer-2");
        let uq = db.get_user_quest(user_id, quest_id).await.unwrap().unwrap();
        assert_eq!(uq.status, QuestStatus::Completed);
        assert!(uq.completed_at.is_some());
        // Progress froze at the completion transition.
        assert_eq!(uq.progress, 2.0);
        // Settlement is claim-only: the balance is untouched.
        assert_eq!(db.points(user_id), 10_000);
    }

    #[tokio::test]
    async fn claim_settles_exactly_once() {
        let (engine, db, user_id) = engine_with_user();
        add_appliance(&db, user_id, "WASHER_AI", "My Washer");
        for _ in 0..2 {
            engine
                .record_appliance_event(user_id, "My Washer")
                .await
                .unwrap();
        }

        let quest_id = quest_id(week_start(Utc::now()), "washer-2");
        let balance = engine.claim_quest(user_id, quest_id).await.unwrap();
        assert_eq!(balance, 10_100);

        let uq = db.get_user_quest(user_id, quest_id).await.unwrap().unwrap();
        assert!(uq.claimed);
        assert!(uq.claimed_at.is_some());

        // Second claim fails and does not credit again.
        let err = engine.claim_quest(user_id, quest_id).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(db.points(user_id), 10_100);
    }

    #[tokio::test]
    async fn claim_on_incomplete_quest_fails_without_mutation() {
        let (engine, db, user_id) = engine_with_user();
        add_appliance(&db, user_id, "WASHER_AI", "My Washer");
        engine.list_user_weekly_quests(user_id).await.unwrap();

        let quest_id = quest_id(week_start(Utc::now()), "washer-2");
        let err = engine.claim_quest(user_id, quest_id).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(db.points(user_id), 10_000);
        let uq = db.get_user_quest(user_id, quest_id).await.unwrap().unwrap();
        assert!(!uq.claimed);
    }

    #[tokio::test]
    async fn claim_without_record_is_not_found() {
        let (engine, _db, user_id) = engine_with_user();
        let quest_id = quest_id(week_start(Utc::now()), "washer-2");
        let err = engine.claim_quest(user_id, quest_id).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn event_for_unknown_appliance_is_a_noop() {
        let (engine, db, user_id) = engine_with_user();
        engine
            .record_appliance_event(user_id, "No Such Device")
            .await
            .unwrap();
        assert!(db.user_quests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duration_progress_is_recomputed_from_live_sum() {
        let (engine, db, user_id) = engine_with_user();
        add_appliance(&db, user_id, "AIR_PURIFIER_360", "Purifier");
        // 11 hours of accumulated on-time across the week.
        db.appliances.lock().unwrap()[0].weekly_duration_sec = 11 * 3600;

        let quests = engine.list_user_weekly_quests(user_id).await.unwrap();
        let view = quests
            .iter()
            .find(|v| v.quest.slug == "purifier-10h")
            .unwrap();
        assert_eq!(view.user_progress.progress, 11.0);
        assert_eq!(view.user_progress.status, QuestStatus::Completed);
        // Completion alone still credits nothing.
        assert_eq!(db.points(user_id), 10_000);
    }

    #[tokio::test]
    async fn stale_records_are_purged_and_recreated_fresh() {
        let (engine, db, user_id) = engine_with_user();
        add_appliance(&db, user_id, "WASHER_AI", "My Washer");

        // A record from last week, with leftover duration on the appliance.
        let last_week = week_start(Utc::now()) - TimeDelta::days(7);
        let old_quest = &weekly_catalog(last_week)[0];
        let mut old = new_user_quest(user_id, old_quest, last_week);
        old.progress = 4.0;
        db.user_quests.lock().unwrap().push(old);
        db.appliances.lock().unwrap()[0].weekly_duration_sec = 777;

        let quests = engine.list_user_weekly_quests(user_id).await.unwrap();
        // The stale record is gone and this week's records start at zero.
        let store = db.user_quests.lock().unwrap();
        assert!(store.iter().all(|uq| uq.week_start == week_start(Utc::now())));
        assert!(quests.iter().all(|v| v.user_progress.progress == 0.0));
        drop(store);
        assert_eq!(db.appliances.lock().unwrap()[0].weekly_duration_sec, 0);
    }

    #[tokio::test]
    async fn two_simulated_cycles_complete_a_goal_of_two() {
        let (engine, db, user_id) = engine_with_user();
        add_appliance(&db, user_id, "WASHER_AI", "My Washer");

        for _ in 0..2 {
            let relevant = {
                let mut appliances = db.appliances.lock().unwrap();
                let a = appliances.iter_mut().find(|a| a.name == "My Washer").unwrap();
                let start = simulate_usage(a, Utc::now());
                let complete = simulate_usage(a, Utc::now());
                start.is_quest_relevant() || complete.is_quest_relevant()
            };
            assert!(relevant);
            engine
                .record_appliance_event(user_id, "My Washer")
                .await
                .unwrap();
        }

        let quest_id = quest_id(week_start(Utc::now()), "washer-2");
        let uq = db.get_user_quest(user_id, quest_id).await.unwrap().unwrap();
        assert_eq!(uq.status, QuestStatus::Completed);
        assert!(!uq.claimed);

        let balance = engine.claim_quest(user_id, quest_id).await.unwrap();
        assert_eq!(balance, 10_100);
    }
}
