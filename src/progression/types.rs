use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::cefr::{clamp_level, is_level_in_range, CefrLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillArea {
    Speaking,
    Writing,
    Listening,
    Reading,
}

impl SkillArea {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speaking" => Some(Self::Speaking),
            "writing" => Some(Self::Writing),
            "listening" => Some(Self::Listening),
            "reading" => Some(Self::Reading),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speaking => "speaking",
            Self::Writing => "writing",
            Self::Listening => "listening",
            Self::Reading => "reading",
        }
    }
}

impl fmt::Display for SkillArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one proficiency track of a learner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillKey {
    pub user_id: String,
    pub skill_area: SkillArea,
    pub question_type: String,
}

impl SkillKey {
    pub fn new(user_id: &str, skill_area: SkillArea, question_type: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            skill_area,
            question_type: question_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSkillLevel {
    pub user_id: String,
    pub skill_area: SkillArea,
    pub question_type: String,
    pub numeric_level: f64,
    pub cefr_level: CefrLevel,
    pub attempts_at_level: i32,
    pub correct_streak: i32,
    /// Bumped on every write; guards the conditional update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSkillLevel {
    pub fn new(key: &SkillKey, numeric_level: f64, now: DateTime<Utc>) -> Self {
        let numeric_level = clamp_level(numeric_level);
        Self {
            user_id: key.user_id.clone(),
            skill_area: key.skill_area,
            question_type: key.question_type.clone(),
            numeric_level,
            cefr_level: CefrLevel::from_numeric(numeric_level),
            attempts_at_level: 0,
            correct_streak: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SkillKey {
        SkillKey::new(&self.user_id, self.skill_area, &self.question_type)
    }

    pub fn set_numeric_level(&mut self, level: f64) {
        self.numeric_level = clamp_level(level);
        self.cefr_level = CefrLevel::from_numeric(self.numeric_level);
    }

    /// Re-establishes the level invariants on a row read from storage.
    /// Returns `true` when the stored level was out of range.
    pub fn repair(&mut self) -> bool {
        let inconsistent = !is_level_in_range(self.numeric_level);
        self.set_numeric_level(self.numeric_level);
        self.attempts_at_level = self.attempts_at_level.max(0);
        self.correct_streak = self.correct_streak.max(0);
        inconsistent
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeItem {
    pub id: String,
    pub skill_area: SkillArea,
    pub question_type: String,
    /// `None` marks a static bank item usable at any level.
    pub cefr_level: Option<CefrLevel>,
    pub content: serde_json::Value,
    pub times_used: i32,
    pub quality_score: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PracticeItem {
    pub fn is_static(&self) -> bool {
        self.cefr_level.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUsage {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub skill_area: SkillArea,
    pub question_type: String,
    pub score: f64,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDay {
    pub date: NaiveDate,
    pub count: i64,
}

impl ActivityDay {
    pub fn new(date: NaiveDate, count: i64) -> Self {
        Self { date, count }
    }

    pub fn is_active(&self) -> bool {
        self.count > 0
    }
}

/// Graded result of one attempt as produced by the grading collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub overall_score: f64,
}

impl PerformanceRecord {
    pub fn new(overall_score: f64) -> Self {
        Self { overall_score }
    }

    pub fn is_valid(&self) -> bool {
        self.overall_score.is_finite() && (0.0..=100.0).contains(&self.overall_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_clamps_out_of_range_level() {
        let key = SkillKey::new("u1", SkillArea::Speaking, "describe_picture");
        let mut level = UserSkillLevel::new(&key, 3.0, Utc::now());
        level.numeric_level = 9.3;
        level.cefr_level = CefrLevel::A1;

        assert!(level.repair());
        assert_eq!(level.numeric_level, 6.0);
        assert_eq!(level.cefr_level, CefrLevel::C2);
    }

    #[test]
    fn test_repair_keeps_valid_level() {
        let key = SkillKey::new("u1", SkillArea::Writing, "essay");
        let mut level = UserSkillLevel::new(&key, 2.7, Utc::now());
        assert!(!level.repair());
        assert_eq!(level.cefr_level, CefrLevel::B1);
    }

    #[test]
    fn test_skill_area_parse() {
        assert_eq!(SkillArea::parse("Speaking"), Some(SkillArea::Speaking));
        assert_eq!(SkillArea::parse("grammar"), None);
    }

    #[test]
    fn test_performance_record_bounds() {
        assert!(PerformanceRecord::new(0.0).is_valid());
        assert!(PerformanceRecord::new(100.0).is_valid());
        assert!(!PerformanceRecord::new(100.5).is_valid());
        assert!(!PerformanceRecord::new(f64::NAN).is_valid());
    }
}
