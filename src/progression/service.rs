use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::adjustment::{advance_level, classify_trend, LevelTrend, TREND_WINDOW};
use super::cefr::{is_level_in_range, CefrLevel};
use super::selection::{PromptSelector, Selection};
use super::streak::{
    compute_streaks, densify, local_today, window_bounds, StreakStats, MAX_WINDOW_WEEKS,
    MIN_WINDOW_WEEKS,
};
use super::types::{ActivityDay, ItemUsage, PerformanceRecord, SkillArea, SkillKey, UserSkillLevel};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::{AttemptWrite, ProgressStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpdate {
    pub level: UserSkillLevel,
    pub previous_level: f64,
    pub previous_cefr_level: CefrLevel,
    pub delta: f64,
    pub band_changed: bool,
    /// Advisory only; the numeric level above is authoritative.
    pub trend: LevelTrend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptInput {
    pub user_id: String,
    pub skill_area: SkillArea,
    pub question_type: String,
    pub score: f64,
    pub item_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    #[serde(flatten)]
    pub update: LevelUpdate,
    pub usage_recorded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub window_weeks: u32,
    pub timezone: String,
    pub days: Vec<ActivityDay>,
    #[serde(flatten)]
    pub streaks: StreakStats,
    pub total_attempts: i64,
}

fn validate_score(score: f64) -> EngineResult<PerformanceRecord> {
    let performance = PerformanceRecord::new(score);
    if !performance.is_valid() {
        return Err(EngineError::InvalidScore(score));
    }
    Ok(performance)
}

/// Entry point used by request handlers. Stateless apart from the store
/// handle, so one instance is shared across requests.
pub struct ProgressionService {
    store: Arc<dyn ProgressStore>,
    config: EngineConfig,
}

impl ProgressionService {
    pub fn new(store: Arc<dyn ProgressStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    async fn load_or_create_level(
        &self,
        key: &SkillKey,
        now: DateTime<Utc>,
    ) -> EngineResult<UserSkillLevel> {
        let mut level = match self.store.get_skill_level(key).await? {
            Some(level) => level,
            None => {
                let fresh = UserSkillLevel::new(key, self.config.default_numeric_level, now);
                tracing::debug!(
                    user_id = %key.user_id,
                    skill_area = %key.skill_area,
                    question_type = %key.question_type,
                    numeric_level = fresh.numeric_level,
                    "creating skill level"
                );
                self.store
                    .insert_skill_level_if_absent(&fresh)
                    .await?
                    .ok_or_else(|| EngineError::NotFound {
                        user_id: key.user_id.clone(),
                        skill_area: key.skill_area,
                        question_type: key.question_type.clone(),
                    })?
            }
        };

        let stored_level = level.numeric_level;
        if level.repair() {
            tracing::warn!(
                user_id = %key.user_id,
                skill_area = %key.skill_area,
                question_type = %key.question_type,
                stored_level,
                clamped_level = level.numeric_level,
                "stored skill level out of range, clamped"
            );
        }

        Ok(level)
    }

    pub async fn get_user_level(
        &self,
        user_id: &str,
        skill_area: SkillArea,
        question_type: &str,
    ) -> EngineResult<UserSkillLevel> {
        let key = SkillKey::new(user_id, skill_area, question_type);
        self.load_or_create_level(&key, Utc::now()).await
    }

    pub async fn list_user_levels(&self, user_id: &str) -> EngineResult<Vec<UserSkillLevel>> {
        let mut levels = self.store.list_skill_levels(user_id).await?;
        for level in levels.iter_mut() {
            if level.repair() {
                tracing::warn!(
                    user_id,
                    skill_area = %level.skill_area,
                    question_type = %level.question_type,
                    "stored skill level out of range, clamped"
                );
            }
        }
        Ok(levels)
    }

    pub async fn update_user_level(
        &self,
        user_id: &str,
        skill_area: SkillArea,
        question_type: &str,
        score: f64,
    ) -> EngineResult<LevelUpdate> {
        let performance = validate_score(score)?;
        let key = SkillKey::new(user_id, skill_area, question_type);
        self.apply_attempt(&key, &performance, Utc::now(), None, None)
            .await
    }

    /// One read-modify-write per attempt. Everything the attempt touches is
    /// committed together; a concurrent writer in between makes the commit
    /// refuse and surfaces as `ConcurrentUpdate` with nothing written.
    async fn apply_attempt(
        &self,
        key: &SkillKey,
        performance: &PerformanceRecord,
        now: DateTime<Utc>,
        usage: Option<ItemUsage>,
        activity_date: Option<NaiveDate>,
    ) -> EngineResult<LevelUpdate> {
        let score = performance.overall_score;
        let current = self.load_or_create_level(key, now).await?;
        let transition = advance_level(&current, performance, now);

        let write = AttemptWrite {
            level: transition.next,
            expected_version: current.version,
            score,
            occurred_at: now,
            usage,
            quality_smoothing: self.config.quality_smoothing,
            activity_date,
        };
        if !self.store.commit_attempt(&write).await? {
            return Err(EngineError::ConcurrentUpdate {
                user_id: key.user_id.clone(),
                skill_area: key.skill_area,
                question_type: key.question_type.clone(),
            });
        }

        let mut level = write.level;
        level.version = current.version + 1;

        let recent_scores = self.store.recent_scores(key, TREND_WINDOW).await?;
        let trend = classify_trend(&recent_scores, level.correct_streak);

        tracing::info!(
            user_id = %key.user_id,
            skill_area = %key.skill_area,
            question_type = %key.question_type,
            score,
            old_level = current.numeric_level,
            new_level = level.numeric_level,
            delta = transition.delta,
            cefr = %level.cefr_level,
            band_changed = transition.band_changed,
            "skill level updated"
        );
        if trend != LevelTrend::Steady {
            tracing::info!(user_id = %key.user_id, ?trend, "level trend signal");
        }

        Ok(LevelUpdate {
            level,
            previous_level: current.numeric_level,
            previous_cefr_level: current.cefr_level,
            delta: transition.delta,
            band_changed: transition.band_changed,
            trend,
        })
    }

    /// Resolves the item and the learner's local day first, then commits the
    /// level update, item usage and activity day as one unit.
    pub async fn record_attempt(&self, input: AttemptInput) -> EngineResult<AttemptOutcome> {
        let performance = validate_score(input.score)?;
        let key = SkillKey::new(&input.user_id, input.skill_area, &input.question_type);

        let item = match input.item_id.as_deref() {
            Some(item_id) => {
                let item = self.store.get_item(item_id).await?;
                if item.is_none() {
                    tracing::warn!(user_id = %input.user_id, item_id, "attempt references unknown item");
                }
                item
            }
            None => None,
        };
        let usage = item.map(|item| ItemUsage {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: input.user_id.clone(),
            item_id: item.id,
            skill_area: input.skill_area,
            question_type: input.question_type.clone(),
            score: input.score,
            used_at: input.occurred_at,
        });
        let usage_recorded = usage.is_some();

        let tz = self.user_timezone(&input.user_id).await?;
        let activity_date = local_today(input.occurred_at, tz);

        let update = self
            .apply_attempt(
                &key,
                &performance,
                input.occurred_at,
                usage,
                Some(activity_date),
            )
            .await?;

        Ok(AttemptOutcome {
            update,
            usage_recorded,
        })
    }

    pub async fn select_prompt_for_user(
        &self,
        user_id: &str,
        skill_area: SkillArea,
        question_type: &str,
    ) -> EngineResult<Selection> {
        self.select_prompt_at(user_id, skill_area, question_type, Utc::now())
            .await
    }

    pub async fn select_prompt_at(
        &self,
        user_id: &str,
        skill_area: SkillArea,
        question_type: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Selection> {
        let key = SkillKey::new(user_id, skill_area, question_type);
        let level = self.load_or_create_level(&key, now).await?;
        let selector = PromptSelector::new(self.store.as_ref(), &self.config.selection);
        Ok(selector.select(&level, now).await?)
    }

    pub async fn reset_user_level(
        &self,
        user_id: &str,
        skill_area: SkillArea,
        question_type: &str,
        numeric_level: f64,
    ) -> EngineResult<UserSkillLevel> {
        if !numeric_level.is_finite() {
            return Err(EngineError::InvalidLevel(numeric_level));
        }

        let key = SkillKey::new(user_id, skill_area, question_type);
        let now = Utc::now();
        let current = self.load_or_create_level(&key, now).await?;

        let mut next = current.clone();
        next.set_numeric_level(numeric_level);
        next.attempts_at_level = 0;
        next.correct_streak = 0;
        next.updated_at = now;

        if !self
            .store
            .update_skill_level_if_version(&next, current.version)
            .await?
        {
            return Err(EngineError::ConcurrentUpdate {
                user_id: key.user_id,
                skill_area,
                question_type: key.question_type,
            });
        }
        next.version = current.version + 1;

        if !is_level_in_range(numeric_level) {
            tracing::debug!(requested = numeric_level, applied = next.numeric_level, "reset level clamped");
        }
        tracing::info!(
            user_id,
            skill_area = %skill_area,
            question_type,
            numeric_level = next.numeric_level,
            "skill level reset"
        );

        Ok(next)
    }

    pub async fn set_user_timezone(&self, user_id: &str, timezone: &str) -> EngineResult<Tz> {
        let tz = timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| EngineError::InvalidTimezone(timezone.to_string()))?;
        self.store.set_user_timezone(user_id, tz.name()).await?;
        Ok(tz)
    }

    async fn user_timezone(&self, user_id: &str) -> EngineResult<Tz> {
        let stored = self.store.user_timezone(user_id).await?;
        Ok(match stored {
            Some(raw) => raw.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(user_id, timezone = %raw, "stored timezone invalid, using default");
                self.config.default_timezone
            }),
            None => self.config.default_timezone,
        })
    }

    pub async fn progress_summary(
        &self,
        user_id: &str,
        window_weeks: Option<u32>,
    ) -> EngineResult<ProgressSummary> {
        self.progress_summary_at(user_id, window_weeks, Utc::now())
            .await
    }

    pub async fn progress_summary_at(
        &self,
        user_id: &str,
        window_weeks: Option<u32>,
        now: DateTime<Utc>,
    ) -> EngineResult<ProgressSummary> {
        let tz = self.user_timezone(user_id).await?;
        let today = local_today(now, tz);
        let weeks = window_weeks
            .unwrap_or(self.config.streak_window_weeks)
            .clamp(MIN_WINDOW_WEEKS, MAX_WINDOW_WEEKS);
        let (from, to) = window_bounds(today, weeks);

        let sparse = self.store.activity_days(user_id, from, to).await?;
        let days = densify(&sparse, from, to);
        let streaks = compute_streaks(&days, today);
        let total_attempts = days.iter().map(|d| d.count).sum();

        Ok(ProgressSummary {
            window_weeks: weeks,
            timezone: tz.name().to_string(),
            days,
            streaks,
            total_attempts,
        })
    }
}
