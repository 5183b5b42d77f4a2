use thiserror::Error;

use crate::progression::types::SkillArea;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration '{name}' failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

impl StoreError {
    pub fn corrupt(table: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("skill level not found for user {user_id} ({skill_area}/{question_type})")]
    NotFound {
        user_id: String,
        skill_area: SkillArea,
        question_type: String,
    },
    #[error("no practice item available for {skill_area}/{question_type}")]
    NoItemAvailable {
        skill_area: SkillArea,
        question_type: String,
    },
    #[error("score {0} is outside [0, 100]")]
    InvalidScore(f64),
    #[error("level {0} is not a finite number")]
    InvalidLevel(f64),
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("skill level for user {user_id} ({skill_area}/{question_type}) changed concurrently")]
    ConcurrentUpdate {
        user_id: String,
        skill_area: SkillArea,
        question_type: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Sqlx(err))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
