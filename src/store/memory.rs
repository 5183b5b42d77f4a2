use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use super::{AttemptWrite, ProgressStore};
use crate::error::StoreError;
use crate::progression::cefr::CefrLevel;
use crate::progression::selection::refine_quality_score;
use crate::progression::types::{ActivityDay, ItemUsage, PracticeItem, SkillArea, SkillKey, UserSkillLevel};

#[derive(Default)]
struct Tables {
    levels: HashMap<SkillKey, UserSkillLevel>,
    items: BTreeMap<String, PracticeItem>,
    usages: Vec<ItemUsage>,
    /// Graded attempt scores in commit order.
    scores: Vec<(SkillKey, f64)>,
    activity: HashMap<(String, NaiveDate), i64>,
    timezones: HashMap<String, String>,
}

/// Process-local store. Each trait call takes the lock once, which gives the
/// same atomicity per call as a single SQL statement.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a stored level as-is, bypassing every invariant. Lets tests
    /// simulate rows written by an older, buggy writer.
    pub fn put_raw_skill_level(&self, level: UserSkillLevel) {
        self.tables.write().levels.insert(level.key(), level);
    }

    pub fn usage_count(&self) -> usize {
        self.tables.read().usages.len()
    }
}

fn write_level(tables: &mut Tables, level: &UserSkillLevel, expected_version: i64) -> bool {
    match tables.levels.get_mut(&level.key()) {
        Some(stored) if stored.version == expected_version => {
            let mut next = level.clone();
            next.version = expected_version + 1;
            next.created_at = stored.created_at;
            *stored = next;
            true
        }
        _ => false,
    }
}

fn usages_for<'a>(tables: &'a Tables, key: &'a SkillKey) -> impl Iterator<Item = &'a ItemUsage> {
    tables.usages.iter().filter(move |u| {
        u.user_id == key.user_id
            && u.skill_area == key.skill_area
            && u.question_type == key.question_type
    })
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get_skill_level(&self, key: &SkillKey) -> Result<Option<UserSkillLevel>, StoreError> {
        Ok(self.tables.read().levels.get(key).cloned())
    }

    async fn insert_skill_level_if_absent(
        &self,
        level: &UserSkillLevel,
    ) -> Result<Option<UserSkillLevel>, StoreError> {
        let mut tables = self.tables.write();
        let stored = tables
            .levels
            .entry(level.key())
            .or_insert_with(|| level.clone());
        Ok(Some(stored.clone()))
    }

    async fn update_skill_level_if_version(
        &self,
        level: &UserSkillLevel,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        Ok(write_level(&mut self.tables.write(), level, expected_version))
    }

    async fn list_skill_levels(&self, user_id: &str) -> Result<Vec<UserSkillLevel>, StoreError> {
        let tables = self.tables.read();
        let mut levels: Vec<UserSkillLevel> = tables
            .levels
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        levels.sort_by(|a, b| {
            a.skill_area
                .as_str()
                .cmp(b.skill_area.as_str())
                .then_with(|| a.question_type.cmp(&b.question_type))
        });
        Ok(levels)
    }

    async fn leveled_items(
        &self,
        skill_area: SkillArea,
        question_type: &str,
        bands: &[CefrLevel],
    ) -> Result<Vec<PracticeItem>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .items
            .values()
            .filter(|item| item.skill_area == skill_area && item.question_type == question_type)
            .filter(|item| item.cefr_level.map(|b| bands.contains(&b)).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn static_items(
        &self,
        skill_area: SkillArea,
        question_type: &str,
    ) -> Result<Vec<PracticeItem>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .items
            .values()
            .filter(|item| item.skill_area == skill_area && item.question_type == question_type)
            .filter(|item| item.is_static())
            .cloned()
            .collect())
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<PracticeItem>, StoreError> {
        Ok(self.tables.read().items.get(item_id).cloned())
    }

    async fn upsert_item(&self, item: &PracticeItem) -> Result<(), StoreError> {
        self.tables
            .write()
            .items
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn used_item_ids(&self, key: &SkillKey) -> Result<HashSet<String>, StoreError> {
        let tables = self.tables.read();
        Ok(usages_for(&tables, key).map(|u| u.item_id.clone()).collect())
    }

    async fn recent_item_ids(
        &self,
        key: &SkillKey,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<HashSet<String>, StoreError> {
        let tables = self.tables.read();
        let mut recent: Vec<&ItemUsage> = usages_for(&tables, key)
            .filter(|u| u.used_at >= since)
            .collect();
        recent.sort_by(|a, b| b.used_at.cmp(&a.used_at));
        Ok(recent
            .into_iter()
            .take(limit)
            .map(|u| u.item_id.clone())
            .collect())
    }

    async fn recent_scores(&self, key: &SkillKey, limit: usize) -> Result<Vec<f64>, StoreError> {
        let tables = self.tables.read();
        let scores: Vec<f64> = tables
            .scores
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, score)| *score)
            .collect();
        let skip = scores.len().saturating_sub(limit);
        Ok(scores[skip..].to_vec())
    }

    async fn commit_attempt(&self, write: &AttemptWrite) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        if !write_level(&mut tables, &write.level, write.expected_version) {
            return Ok(false);
        }

        tables.scores.push((write.level.key(), write.score));

        if let Some(usage) = write.usage.as_ref() {
            if let Some(item) = tables.items.get_mut(&usage.item_id) {
                item.times_used = item.times_used.saturating_add(1);
                item.quality_score = Some(refine_quality_score(
                    item.quality_score,
                    usage.score,
                    write.quality_smoothing,
                ));
            }
            tables.usages.push(usage.clone());
        }

        if let Some(date) = write.activity_date {
            *tables
                .activity
                .entry((write.level.user_id.clone(), date))
                .or_insert(0) += 1;
        }

        Ok(true)
    }

    async fn activity_days(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActivityDay>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .activity
            .iter()
            .filter(|((user, date), count)| user == user_id && *date >= from && *date <= to && **count > 0)
            .map(|((_, date), count)| ActivityDay::new(*date, *count))
            .collect())
    }

    async fn user_timezone(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.read().timezones.get(user_id).cloned())
    }

    async fn set_user_timezone(&self, user_id: &str, timezone: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .timezones
            .insert(user_id.to_string(), timezone.to_string());
        Ok(())
    }
}
