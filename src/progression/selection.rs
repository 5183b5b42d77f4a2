use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::cefr::CefrLevel;
use super::types::{PracticeItem, SkillArea, UserSkillLevel};
use crate::error::{EngineError, StoreError};
use crate::store::ProgressStore;

const DEFAULT_RECENT_WINDOW_DAYS: i64 = 7;
const DEFAULT_RECENT_ATTEMPT_LIMIT: usize = 10;
pub const MAX_RECENT_WINDOW_DAYS: u64 = 3650;
pub const MAX_RECENT_ATTEMPT_LIMIT: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionConfig {
    /// Static items used within this many days are avoided while others exist.
    pub recent_window_days: i64,
    /// Caps the recency window to this many most recent attempts.
    pub recent_attempt_limit: usize,
}

impl SelectionConfig {
    /// Bounds both knobs so the window stays representable as a timestamp
    /// offset and the limit fits a SQL `LIMIT`.
    pub fn new(recent_window_days: u64, recent_attempt_limit: u64) -> Self {
        Self {
            recent_window_days: recent_window_days.min(MAX_RECENT_WINDOW_DAYS) as i64,
            recent_attempt_limit: recent_attempt_limit.min(MAX_RECENT_ATTEMPT_LIMIT) as usize,
        }
    }

    /// Start of the recency window. Saturates at the earliest representable
    /// instant instead of overflowing.
    pub fn recent_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(self.recent_window_days.max(0))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn attempt_limit(&self) -> usize {
        self.recent_attempt_limit.min(MAX_RECENT_ATTEMPT_LIMIT as usize)
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
            recent_attempt_limit: DEFAULT_RECENT_ATTEMPT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    AdjacentLevel,
    PoolExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedPrompt {
    pub item: PracticeItem,
    pub source: SelectionSource,
    pub user_level: CefrLevel,
    pub numeric_level: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Selected(SelectedPrompt),
    /// Nothing exists for this skill area and question type at any tier.
    Exhausted {
        skill_area: SkillArea,
        question_type: String,
        user_level: CefrLevel,
    },
}

impl Selection {
    pub fn into_result(self) -> Result<SelectedPrompt, EngineError> {
        match self {
            Selection::Selected(prompt) => Ok(prompt),
            Selection::Exhausted {
                skill_area,
                question_type,
                ..
            } => Err(EngineError::NoItemAvailable {
                skill_area,
                question_type,
            }),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Selection::Exhausted { .. })
    }
}

/// Least used first, then best quality (unrated last), then id.
pub fn compare_items(a: &PracticeItem, b: &PracticeItem) -> Ordering {
    a.times_used
        .cmp(&b.times_used)
        .then_with(|| match (a.quality_score, b.quality_score) {
            (Some(qa), Some(qb)) => qb.total_cmp(&qa),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

pub fn pick_best<'a, I>(items: I) -> Option<&'a PracticeItem>
where
    I: IntoIterator<Item = &'a PracticeItem>,
{
    items.into_iter().min_by(|a, b| compare_items(a, b))
}

/// Best unexpired item whose id is not in `excluded`.
pub fn pick_fresh<'a>(
    items: &'a [PracticeItem],
    excluded: &HashSet<String>,
    now: DateTime<Utc>,
) -> Option<&'a PracticeItem> {
    pick_best(
        items
            .iter()
            .filter(|item| !item.is_expired(now) && !excluded.contains(&item.id)),
    )
}

/// Avoids recently attempted items, repeats when every item is recent.
pub fn pick_least_recent<'a>(
    items: &'a [PracticeItem],
    recent: &HashSet<String>,
    now: DateTime<Utc>,
) -> Option<&'a PracticeItem> {
    pick_fresh(items, recent, now).or_else(|| pick_fresh(items, &HashSet::new(), now))
}

/// Moves an item's quality toward the latest score. The first score is taken
/// as is; the result always stays within [0, 100].
pub fn refine_quality_score(previous: Option<f64>, score: f64, smoothing: f64) -> f64 {
    let score = score.clamp(0.0, 100.0);
    let alpha = smoothing.clamp(0.0, 1.0);
    match previous.filter(|q| q.is_finite()) {
        Some(prev) => {
            let prev = prev.clamp(0.0, 100.0);
            (prev + alpha * (score - prev)).clamp(0.0, 100.0)
        }
        None => score,
    }
}

/// Walks the fallback ladder: exact band, adjacent bands, static bank, then
/// repeats from the whole leveled catalog. Only an empty catalog exhausts it.
pub struct PromptSelector<'a> {
    store: &'a dyn ProgressStore,
    config: &'a SelectionConfig,
}

impl<'a> PromptSelector<'a> {
    pub fn new(store: &'a dyn ProgressStore, config: &'a SelectionConfig) -> Self {
        Self { store, config }
    }

    pub async fn select(
        &self,
        level: &UserSkillLevel,
        now: DateTime<Utc>,
    ) -> Result<Selection, StoreError> {
        let key = level.key();
        let band = level.cefr_level;
        let used = self.store.used_item_ids(&key).await?;

        let exact = self
            .store
            .leveled_items(key.skill_area, &key.question_type, &[band])
            .await?;
        if let Some(item) = pick_fresh(&exact, &used, now) {
            return Ok(self.selected(level, item.clone(), SelectionSource::Generated, None));
        }

        let adjacent_bands = band.adjacent();
        let adjacent = self
            .store
            .leveled_items(key.skill_area, &key.question_type, &adjacent_bands)
            .await?;
        if let Some(item) = pick_fresh(&adjacent, &used, now) {
            tracing::debug!(
                user_id = %key.user_id,
                skill_area = %key.skill_area,
                question_type = %key.question_type,
                band = %band,
                item_band = ?item.cefr_level,
                "exact band exhausted, using adjacent band"
            );
            return Ok(self.selected(
                level,
                item.clone(),
                SelectionSource::Generated,
                Some(FallbackReason::AdjacentLevel),
            ));
        }

        let static_items = self
            .store
            .static_items(key.skill_area, &key.question_type)
            .await?;
        let since = self.config.recent_since(now);
        let recent = self
            .store
            .recent_item_ids(&key, since, self.config.attempt_limit())
            .await?;

        if let Some(item) = pick_least_recent(&static_items, &recent, now) {
            tracing::info!(
                user_id = %key.user_id,
                skill_area = %key.skill_area,
                question_type = %key.question_type,
                band = %band,
                repeat = recent.contains(&item.id),
                "leveled pool exhausted, using static bank"
            );
            return Ok(self.selected(
                level,
                item.clone(),
                SelectionSource::Fallback,
                Some(FallbackReason::PoolExhausted),
            ));
        }

        let catalog = self
            .store
            .leveled_items(key.skill_area, &key.question_type, &CefrLevel::ALL)
            .await?;
        if let Some(item) = pick_least_recent(&catalog, &recent, now) {
            tracing::info!(
                user_id = %key.user_id,
                skill_area = %key.skill_area,
                question_type = %key.question_type,
                band = %band,
                item_band = ?item.cefr_level,
                repeat = used.contains(&item.id),
                "no fresh or static item, reusing leveled catalog"
            );
            return Ok(self.selected(
                level,
                item.clone(),
                SelectionSource::Fallback,
                Some(FallbackReason::PoolExhausted),
            ));
        }

        tracing::warn!(
            user_id = %key.user_id,
            skill_area = %key.skill_area,
            question_type = %key.question_type,
            "no practice item available at any tier"
        );
        Ok(Selection::Exhausted {
            skill_area: key.skill_area,
            question_type: key.question_type,
            user_level: band,
        })
    }

    fn selected(
        &self,
        level: &UserSkillLevel,
        item: PracticeItem,
        source: SelectionSource,
        fallback_reason: Option<FallbackReason>,
    ) -> Selection {
        Selection::Selected(SelectedPrompt {
            item,
            source,
            user_level: level.cefr_level,
            numeric_level: level.numeric_level,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, times_used: i32, quality: Option<f64>) -> PracticeItem {
        PracticeItem {
            id: id.to_string(),
            skill_area: SkillArea::Speaking,
            question_type: "describe_picture".to_string(),
            cefr_level: Some(CefrLevel::B1),
            content: serde_json::json!({ "prompt": id }),
            times_used,
            quality_score: quality,
            expires_at: None,
        }
    }

    #[test]
    fn test_least_used_wins() {
        let items = vec![item("a", 3, Some(99.0)), item("b", 1, Some(10.0))];
        assert_eq!(pick_best(&items).map(|i| i.id.as_str()), Some("b"));
    }

    #[test]
    fn test_quality_breaks_ties_and_unrated_rank_last() {
        let items = vec![
            item("a", 0, None),
            item("b", 0, Some(40.0)),
            item("c", 0, Some(80.0)),
        ];
        assert_eq!(pick_best(&items).map(|i| i.id.as_str()), Some("c"));

        let unrated_vs_rated = vec![item("a", 0, None), item("z", 0, Some(1.0))];
        assert_eq!(pick_best(&unrated_vs_rated).map(|i| i.id.as_str()), Some("z"));
    }

    #[test]
    fn test_id_is_final_tie_break() {
        let items = vec![item("m", 0, None), item("d", 0, None)];
        assert_eq!(pick_best(&items).map(|i| i.id.as_str()), Some("d"));
    }

    #[test]
    fn test_pick_fresh_skips_used_and_expired() {
        let now = Utc::now();
        let mut expired = item("a", 0, Some(90.0));
        expired.expires_at = Some(now - Duration::hours(1));
        let items = vec![expired, item("b", 0, None), item("c", 5, None)];

        let used: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(pick_fresh(&items, &used, now).map(|i| i.id.as_str()), Some("c"));
    }

    #[test]
    fn test_pick_least_recent_repeats_when_all_recent() {
        let now = Utc::now();
        let items = vec![item("a", 2, None), item("b", 1, None)];

        let recent: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(pick_least_recent(&items, &recent, now).map(|i| i.id.as_str()), Some("a"));

        let all: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        assert_eq!(pick_least_recent(&items, &all, now).map(|i| i.id.as_str()), Some("b"));

        assert!(pick_least_recent(&[], &all, now).is_none());
    }

    #[test]
    fn test_config_bounds_window_and_limit() {
        let config = SelectionConfig::new(u64::MAX, u64::MAX);
        assert_eq!(config.recent_window_days, MAX_RECENT_WINDOW_DAYS as i64);
        assert_eq!(config.recent_attempt_limit, MAX_RECENT_ATTEMPT_LIMIT as usize);

        let now = Utc::now();
        assert_eq!(config.recent_since(now), now - Duration::days(3650));
    }

    #[test]
    fn test_recent_since_saturates() {
        let now = Utc::now();
        let unbounded = SelectionConfig {
            recent_window_days: i64::MAX,
            recent_attempt_limit: usize::MAX,
        };
        assert_eq!(unbounded.recent_since(now), DateTime::<Utc>::MIN_UTC);
        assert_eq!(unbounded.attempt_limit(), MAX_RECENT_ATTEMPT_LIMIT as usize);

        let negative = SelectionConfig {
            recent_window_days: -5,
            recent_attempt_limit: 10,
        };
        assert_eq!(negative.recent_since(now), now);
    }

    #[test]
    fn test_quality_refinement() {
        assert_eq!(refine_quality_score(None, 72.0, 0.2), 72.0);
        assert!((refine_quality_score(Some(50.0), 100.0, 0.2) - 60.0).abs() < 1e-9);
        assert!((refine_quality_score(Some(50.0), 0.0, 0.2) - 40.0).abs() < 1e-9);
        assert_eq!(refine_quality_score(Some(250.0), 100.0, 0.5), 100.0);
    }
}
