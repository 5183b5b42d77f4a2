//! Adaptive proficiency and engagement engine.
//!
//! `adjustment`, `cefr` and `streak` are pure; `selection` and `service`
//! talk to a [`ProgressStore`](crate::store::ProgressStore).

pub mod adjustment;
pub mod cefr;
pub mod selection;
pub mod service;
pub mod streak;
pub mod types;

pub use adjustment::LevelTrend;
pub use cefr::CefrLevel;
pub use selection::{FallbackReason, SelectedPrompt, Selection, SelectionConfig, SelectionSource};
pub use service::{AttemptInput, AttemptOutcome, LevelUpdate, ProgressSummary, ProgressionService};
pub use streak::StreakStats;
pub use types::{ActivityDay, ItemUsage, PerformanceRecord, PracticeItem, SkillArea, SkillKey, UserSkillLevel};
