use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cefr::clamp_level;
use super::types::{PerformanceRecord, UserSkillLevel};

/// (minimum overall score, delta), checked top-down.
const SCORE_BANDS: [(f64, f64); 4] = [(85.0, 0.15), (70.0, 0.05), (55.0, 0.0), (40.0, -0.05)];
const FLOOR_DELTA: f64 = -0.15;

pub const GOOD_SCORE: f64 = 70.0;
const ADEQUATE_MIN_SCORE: f64 = 55.0;

const STREAK_BONUS: f64 = 0.05;
const STREAK_BONUS_MIN_STREAK: i32 = 5;
const STABILITY_MIN_ATTEMPTS: i32 = 10;

pub const TREND_WINDOW: usize = 5;
const LEVEL_UP_MEAN: f64 = 85.0;
const LEVEL_DOWN_MEAN: f64 = 40.0;
const LEVEL_UP_MIN_STREAK: i32 = 5;

const LEVEL_PRECISION: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelTrend {
    Steady,
    LevelUp,
    LevelDown,
}

pub fn base_delta(overall_score: f64) -> f64 {
    SCORE_BANDS
        .iter()
        .find(|(min_score, _)| overall_score >= *min_score)
        .map(|(_, delta)| *delta)
        .unwrap_or(FLOOR_DELTA)
}

fn is_adequate(overall_score: f64) -> bool {
    (ADEQUATE_MIN_SCORE..GOOD_SCORE).contains(&overall_score)
}

/// Signed level change for one graded attempt. `correct_streak` and
/// `attempts_at_level` are the values before this attempt is counted.
pub fn calculate_level_adjustment(
    performance: &PerformanceRecord,
    attempts_at_level: i32,
    correct_streak: i32,
) -> f64 {
    let score = performance.overall_score;
    let mut delta = base_delta(score);

    if correct_streak >= STREAK_BONUS_MIN_STREAK && score >= GOOD_SCORE {
        delta += STREAK_BONUS;
    }

    if attempts_at_level >= STABILITY_MIN_ATTEMPTS && is_adequate(score) {
        delta = delta.max(0.0);
    }

    delta
}

pub fn apply_level_adjustment(current_level: f64, delta: f64) -> f64 {
    // Rounded so repeated small steps land exactly on band breakpoints.
    let next = clamp_level(current_level + delta);
    (next * LEVEL_PRECISION).round() / LEVEL_PRECISION
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelTransition {
    pub next: UserSkillLevel,
    pub delta: f64,
    pub band_changed: bool,
}

/// Full state transition for one attempt: level, band, attempt counter and
/// streak. Does not touch `version`; the store owns that.
pub fn advance_level(
    state: &UserSkillLevel,
    performance: &PerformanceRecord,
    now: DateTime<Utc>,
) -> LevelTransition {
    let delta = calculate_level_adjustment(
        performance,
        state.attempts_at_level,
        state.correct_streak,
    );

    let mut next = state.clone();
    next.set_numeric_level(apply_level_adjustment(state.numeric_level, delta));

    let band_changed = next.cefr_level != state.cefr_level;
    next.attempts_at_level = if band_changed {
        0
    } else {
        state.attempts_at_level.saturating_add(1)
    };

    next.correct_streak = if performance.overall_score >= GOOD_SCORE {
        state.correct_streak.saturating_add(1)
    } else {
        0
    };
    next.updated_at = now;

    LevelTransition {
        next,
        delta,
        band_changed,
    }
}

fn trailing_mean(recent_scores: &[f64]) -> Option<f64> {
    if recent_scores.len() < TREND_WINDOW {
        return None;
    }
    let window = &recent_scores[recent_scores.len() - TREND_WINDOW..];
    Some(window.iter().sum::<f64>() / TREND_WINDOW as f64)
}

/// `recent_scores` is ordered oldest first.
pub fn should_level_up(recent_scores: &[f64], correct_streak: i32) -> bool {
    trailing_mean(recent_scores)
        .map(|mean| mean >= LEVEL_UP_MEAN && correct_streak >= LEVEL_UP_MIN_STREAK)
        .unwrap_or(false)
}

pub fn should_level_down(recent_scores: &[f64]) -> bool {
    trailing_mean(recent_scores)
        .map(|mean| mean < LEVEL_DOWN_MEAN)
        .unwrap_or(false)
}

pub fn classify_trend(recent_scores: &[f64], correct_streak: i32) -> LevelTrend {
    if should_level_up(recent_scores, correct_streak) {
        LevelTrend::LevelUp
    } else if should_level_down(recent_scores) {
        LevelTrend::LevelDown
    } else {
        LevelTrend::Steady
    }
}
