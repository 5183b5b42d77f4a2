//! Daily and weekly practice streaks.
//!
//! Everything here is a pure function of an activity series and the
//! learner's local "today", so the dashboard numbers can be reproduced
//! from the activity log alone.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::types::ActivityDay;

pub const MIN_WINDOW_WEEKS: u32 = 1;
pub const MAX_WINDOW_WEEKS: u32 = 52;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStats {
    pub current_streak_days: u32,
    pub best_streak_days: u32,
    pub current_streak_weeks: u32,
    pub best_streak_weeks: u32,
}

pub fn local_today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Whole ISO weeks ending with the week of `today`, cut off at `today`.
pub fn window_bounds(today: NaiveDate, weeks: u32) -> (NaiveDate, NaiveDate) {
    let weeks = weeks.clamp(MIN_WINDOW_WEEKS, MAX_WINDOW_WEEKS);
    let start = week_start(today) - Duration::weeks(weeks as i64 - 1);
    (start, today)
}

/// Expands a sparse activity list into one entry per day in `[from, to]`.
pub fn densify(sparse: &[ActivityDay], from: NaiveDate, to: NaiveDate) -> Vec<ActivityDay> {
    let counts = daily_counts(sparse);
    from.iter_days()
        .take_while(|date| *date <= to)
        .map(|date| ActivityDay::new(date, counts.get(&date).copied().unwrap_or(0)))
        .collect()
}

fn daily_counts(days: &[ActivityDay]) -> BTreeMap<NaiveDate, i64> {
    let mut counts = BTreeMap::new();
    for day in days {
        *counts.entry(day.date).or_insert(0) += day.count.max(0);
    }
    counts
}

fn is_active(counts: &BTreeMap<NaiveDate, i64>, date: NaiveDate) -> bool {
    counts.get(&date).map(|c| *c > 0).unwrap_or(false)
}

fn walk_back(counts: &BTreeMap<NaiveDate, i64>, from: NaiveDate, step: Duration) -> u32 {
    let mut cursor = from;
    let mut length = 0u32;
    while is_active(counts, cursor) {
        length += 1;
        cursor = cursor - step;
    }
    length
}

fn longest_run(counts: &BTreeMap<NaiveDate, i64>, step: Duration) -> u32 {
    let mut best = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for (date, count) in counts {
        if *count <= 0 {
            run = 0;
            previous = None;
            continue;
        }
        run = match previous {
            Some(prev) if *date - prev == step => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(*date);
    }

    best
}

/// Returns `(current, best)`. An idle today falls back to yesterday so a
/// streak survives until the day is over.
pub fn daily_streaks(days: &[ActivityDay], today: NaiveDate) -> (u32, u32) {
    let mut counts = daily_counts(days);
    counts.retain(|date, _| *date <= today);

    let one_day = Duration::days(1);
    let current = if is_active(&counts, today) {
        walk_back(&counts, today, one_day)
    } else {
        walk_back(&counts, today - one_day, one_day)
    };

    let best = longest_run(&counts, one_day).max(current);
    (current, best)
}

/// Returns `(current, best)` over Monday-start weeks. No grace period: a
/// current week without activity means a current streak of zero.
pub fn weekly_streaks(days: &[ActivityDay], today: NaiveDate) -> (u32, u32) {
    let mut weeks: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for day in days.iter().filter(|d| d.date <= today) {
        *weeks.entry(week_start(day.date)).or_insert(0) += day.count.max(0);
    }

    let one_week = Duration::weeks(1);
    let current = walk_back(&weeks, week_start(today), one_week);
    let best = longest_run(&weeks, one_week).max(current);
    (current, best)
}

pub fn compute_streaks(days: &[ActivityDay], today: NaiveDate) -> StreakStats {
    let (current_streak_days, best_streak_days) = daily_streaks(days, today);
    let (current_streak_weeks, best_streak_weeks) = weekly_streaks(days, today);

    StreakStats {
        current_streak_days,
        best_streak_days,
        current_streak_weeks,
        best_streak_weeks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-01 is a Monday.
    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn activity(entries: &[(u32, i64)]) -> Vec<ActivityDay> {
        entries
            .iter()
            .map(|(d, count)| ActivityDay::new(day(*d), *count))
            .collect()
    }

    #[test]
    fn test_gap_breaks_current_streak() {
        let days = activity(&[(1, 1), (2, 1), (3, 0), (4, 1)]);
        assert_eq!(daily_streaks(&days, day(4)), (1, 2));
    }

    #[test]
    fn test_grace_period_counts_through_yesterday() {
        let days = activity(&[(2, 2), (3, 1), (4, 0)]);
        assert_eq!(daily_streaks(&days, day(4)), (2, 2));
    }

    #[test]
    fn test_no_activity_today_or_yesterday() {
        let days = activity(&[(1, 1), (2, 1)]);
        assert_eq!(daily_streaks(&days, day(4)), (0, 2));
    }

    #[test]
    fn test_empty_series() {
        assert_eq!(compute_streaks(&[], day(10)), StreakStats::default());
    }

    #[test]
    fn test_future_days_are_ignored() {
        let days = activity(&[(3, 1), (4, 1), (5, 1)]);
        assert_eq!(daily_streaks(&days, day(4)), (2, 2));
    }

    #[test]
    fn test_weekly_gap_breaks_current_streak() {
        // Weeks of Jan 1 and Jan 8 active, Jan 15 idle, Jan 22 active.
        let days = activity(&[(2, 1), (10, 3), (23, 1)]);
        assert_eq!(weekly_streaks(&days, day(24)), (1, 2));
    }

    #[test]
    fn test_weekly_has_no_grace_period() {
        let days = activity(&[(2, 1), (10, 1)]);
        assert_eq!(weekly_streaks(&days, day(15)), (0, 2));
    }

    #[test]
    fn test_week_start_is_monday() {
        assert_eq!(week_start(day(7)), day(1));
        assert_eq!(week_start(day(8)), day(8));
    }

    #[test]
    fn test_window_bounds_cover_whole_weeks() {
        let (start, end) = window_bounds(day(24), 4);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, day(24));

        let (start, _) = window_bounds(day(24), 0);
        assert_eq!(start, day(22));
    }

    #[test]
    fn test_densify_fills_gaps() {
        let days = activity(&[(2, 1), (4, 3)]);
        let dense = densify(&days, day(1), day(5));
        let counts: Vec<i64> = dense.iter().map(|d| d.count).collect();
        assert_eq!(counts, vec![0, 1, 0, 3, 0]);
    }

    #[test]
    fn test_local_today_respects_timezone() {
        let now = DateTime::parse_from_rfc3339("2024-01-05T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(local_today(now, Tz::UTC), day(5));
        assert_eq!(local_today(now, chrono_tz::Asia::Tokyo), day(6));
        assert_eq!(local_today(now, chrono_tz::America::New_York), day(5));
    }
}
