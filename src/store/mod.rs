pub mod memory;
pub mod migrate;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::progression::cefr::CefrLevel;
use crate::progression::types::{ActivityDay, ItemUsage, PracticeItem, SkillArea, SkillKey, UserSkillLevel};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Everything one graded attempt writes. Applied all-or-nothing: when the
/// stored level no longer has `expected_version`, nothing is written.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptWrite {
    pub level: UserSkillLevel,
    pub expected_version: i64,
    pub score: f64,
    pub occurred_at: DateTime<Utc>,
    /// Usage of a catalog item; bumps `timesUsed` and folds `score` into the
    /// item's quality with `quality_smoothing`, computed against the stored value.
    pub usage: Option<ItemUsage>,
    pub quality_smoothing: f64,
    /// Learner-local calendar day to count as active.
    pub activity_date: Option<NaiveDate>,
}

/// Persistence boundary of the engine. Implementations must make each
/// method a single atomic round-trip; the engine never retries.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_skill_level(&self, key: &SkillKey) -> Result<Option<UserSkillLevel>, StoreError>;

    /// Inserts `level` unless a row for its key exists. Returns the row that
    /// is stored afterwards, whichever writer won, or `None` if it cannot be
    /// read back.
    async fn insert_skill_level_if_absent(
        &self,
        level: &UserSkillLevel,
    ) -> Result<Option<UserSkillLevel>, StoreError>;

    /// Writes `level` with `version = expected_version + 1` only if the stored
    /// row still has `expected_version`. Returns whether the write happened.
    async fn update_skill_level_if_version(
        &self,
        level: &UserSkillLevel,
        expected_version: i64,
    ) -> Result<bool, StoreError>;

    async fn list_skill_levels(&self, user_id: &str) -> Result<Vec<UserSkillLevel>, StoreError>;

    /// Leveled (non-static) items in any of `bands`, including expired ones.
    async fn leveled_items(
        &self,
        skill_area: SkillArea,
        question_type: &str,
        bands: &[CefrLevel],
    ) -> Result<Vec<PracticeItem>, StoreError>;

    async fn static_items(
        &self,
        skill_area: SkillArea,
        question_type: &str,
    ) -> Result<Vec<PracticeItem>, StoreError>;

    async fn get_item(&self, item_id: &str) -> Result<Option<PracticeItem>, StoreError>;

    async fn upsert_item(&self, item: &PracticeItem) -> Result<(), StoreError>;

    async fn used_item_ids(&self, key: &SkillKey) -> Result<HashSet<String>, StoreError>;

    /// Ids of items used since `since`, limited to the `limit` most recent usages.
    async fn recent_item_ids(
        &self,
        key: &SkillKey,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<HashSet<String>, StoreError>;

    /// Scores of the `limit` most recently committed attempts, oldest first.
    /// Every graded attempt is logged, with or without an item.
    async fn recent_scores(&self, key: &SkillKey, limit: usize) -> Result<Vec<f64>, StoreError>;

    /// Version-guarded level write plus the attempt's score log entry, item
    /// usage and activity day, in one atomic unit. Returns whether it applied.
    async fn commit_attempt(&self, write: &AttemptWrite) -> Result<bool, StoreError>;

    /// Non-zero activity days in `[from, to]`, in no particular order.
    async fn activity_days(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActivityDay>, StoreError>;

    async fn user_timezone(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    async fn set_user_timezone(&self, user_id: &str, timezone: &str) -> Result<(), StoreError>;
}
