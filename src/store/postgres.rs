use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

use super::{migrate, AttemptWrite, ProgressStore};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::progression::cefr::CefrLevel;
use crate::progression::types::{ActivityDay, PracticeItem, SkillArea, SkillKey, UserSkillLevel};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(max_connections = config.max_connections, "postgres pool ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        migrate::run_migrations(&self.pool).await
    }
}

fn parse_skill_area(table: &'static str, raw: &str) -> Result<SkillArea, StoreError> {
    SkillArea::parse(raw).ok_or_else(|| StoreError::corrupt(table, format!("skill area {raw:?}")))
}

fn row_to_level(row: &PgRow) -> Result<UserSkillLevel, StoreError> {
    let skill_area: String = row.try_get("skillArea")?;
    let cefr: String = row.try_get("cefrLevel")?;
    let numeric_level: f64 = row.try_get("numericLevel")?;

    Ok(UserSkillLevel {
        user_id: row.try_get("userId")?,
        skill_area: parse_skill_area("user_skill_levels", &skill_area)?,
        question_type: row.try_get("questionType")?,
        numeric_level,
        // Recomputed by the engine on read; the column is for reporting only.
        cefr_level: CefrLevel::parse(&cefr).unwrap_or_else(|| CefrLevel::from_numeric(numeric_level)),
        attempts_at_level: row.try_get("attemptsAtLevel")?,
        correct_streak: row.try_get("correctStreak")?,
        version: row.try_get("version")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<PracticeItem, StoreError> {
    let skill_area: String = row.try_get("skillArea")?;
    let cefr: Option<String> = row.try_get("cefrLevel")?;
    let cefr_level = match cefr {
        Some(raw) => Some(
            CefrLevel::parse(&raw)
                .ok_or_else(|| StoreError::corrupt("practice_items", format!("cefr level {raw:?}")))?,
        ),
        None => None,
    };

    Ok(PracticeItem {
        id: row.try_get("id")?,
        skill_area: parse_skill_area("practice_items", &skill_area)?,
        question_type: row.try_get("questionType")?,
        cefr_level,
        content: row.try_get("content")?,
        times_used: row.try_get("timesUsed")?,
        quality_score: row.try_get("qualityScore")?,
        expires_at: row.try_get("expiresAt")?,
    })
}

fn level_update(level: &UserSkillLevel, expected_version: i64) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"UPDATE "user_skill_levels"
           SET "numericLevel" = $4, "cefrLevel" = $5, "attemptsAtLevel" = $6,
               "correctStreak" = $7, "version" = "version" + 1, "updatedAt" = $8
           WHERE "userId" = $1 AND "skillArea" = $2 AND "questionType" = $3
             AND "version" = $9"#,
    )
    .bind(&level.user_id)
    .bind(level.skill_area.as_str())
    .bind(&level.question_type)
    .bind(level.numeric_level)
    .bind(level.cefr_level.as_str())
    .bind(level.attempts_at_level)
    .bind(level.correct_streak)
    .bind(level.updated_at)
    .bind(expected_version)
}

const LEVEL_COLUMNS: &str = r#""userId", "skillArea", "questionType", "numericLevel", "cefrLevel",
    "attemptsAtLevel", "correctStreak", "version", "createdAt", "updatedAt""#;

const ITEM_COLUMNS: &str = r#""id", "skillArea", "questionType", "cefrLevel", "content",
    "timesUsed", "qualityScore", "expiresAt""#;

#[async_trait]
impl ProgressStore for PgStore {
    async fn get_skill_level(&self, key: &SkillKey) -> Result<Option<UserSkillLevel>, StoreError> {
        let sql = format!(
            r#"SELECT {LEVEL_COLUMNS} FROM "user_skill_levels"
               WHERE "userId" = $1 AND "skillArea" = $2 AND "questionType" = $3"#
        );
        let row = sqlx::query(&sql)
            .bind(&key.user_id)
            .bind(key.skill_area.as_str())
            .bind(&key.question_type)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_level).transpose()
    }

    async fn insert_skill_level_if_absent(
        &self,
        level: &UserSkillLevel,
    ) -> Result<Option<UserSkillLevel>, StoreError> {
        sqlx::query(
            r#"INSERT INTO "user_skill_levels"
               ("userId", "skillArea", "questionType", "numericLevel", "cefrLevel",
                "attemptsAtLevel", "correctStreak", "version", "createdAt", "updatedAt")
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT ("userId", "skillArea", "questionType") DO NOTHING"#,
        )
        .bind(&level.user_id)
        .bind(level.skill_area.as_str())
        .bind(&level.question_type)
        .bind(level.numeric_level)
        .bind(level.cefr_level.as_str())
        .bind(level.attempts_at_level)
        .bind(level.correct_streak)
        .bind(level.version)
        .bind(level.created_at)
        .bind(level.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_skill_level(&level.key()).await
    }

    async fn update_skill_level_if_version(
        &self,
        level: &UserSkillLevel,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let result = level_update(level, expected_version)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_skill_levels(&self, user_id: &str) -> Result<Vec<UserSkillLevel>, StoreError> {
        let sql = format!(
            r#"SELECT {LEVEL_COLUMNS} FROM "user_skill_levels"
               WHERE "userId" = $1 ORDER BY "skillArea", "questionType""#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_level).collect()
    }

    async fn leveled_items(
        &self,
        skill_area: SkillArea,
        question_type: &str,
        bands: &[CefrLevel],
    ) -> Result<Vec<PracticeItem>, StoreError> {
        let bands: Vec<String> = bands.iter().map(|b| b.as_str().to_string()).collect();
        let sql = format!(
            r#"SELECT {ITEM_COLUMNS} FROM "practice_items"
               WHERE "skillArea" = $1 AND "questionType" = $2 AND "cefrLevel" = ANY($3)"#
        );
        let rows = sqlx::query(&sql)
            .bind(skill_area.as_str())
            .bind(question_type)
            .bind(bands)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn static_items(
        &self,
        skill_area: SkillArea,
        question_type: &str,
    ) -> Result<Vec<PracticeItem>, StoreError> {
        let sql = format!(
            r#"SELECT {ITEM_COLUMNS} FROM "practice_items"
               WHERE "skillArea" = $1 AND "questionType" = $2 AND "cefrLevel" IS NULL"#
        );
        let rows = sqlx::query(&sql)
            .bind(skill_area.as_str())
            .bind(question_type)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<PracticeItem>, StoreError> {
        let sql = format!(r#"SELECT {ITEM_COLUMNS} FROM "practice_items" WHERE "id" = $1"#);
        let row = sqlx::query(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn upsert_item(&self, item: &PracticeItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO "practice_items"
               ("id", "skillArea", "questionType", "cefrLevel", "content",
                "timesUsed", "qualityScore", "expiresAt")
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT ("id") DO UPDATE SET
                 "skillArea" = EXCLUDED."skillArea",
                 "questionType" = EXCLUDED."questionType",
                 "cefrLevel" = EXCLUDED."cefrLevel",
                 "content" = EXCLUDED."content",
                 "timesUsed" = EXCLUDED."timesUsed",
                 "qualityScore" = EXCLUDED."qualityScore",
                 "expiresAt" = EXCLUDED."expiresAt""#,
        )
        .bind(&item.id)
        .bind(item.skill_area.as_str())
        .bind(&item.question_type)
        .bind(item.cefr_level.map(|b| b.as_str()))
        .bind(&item.content)
        .bind(item.times_used)
        .bind(item.quality_score)
        .bind(item.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn used_item_ids(&self, key: &SkillKey) -> Result<HashSet<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"SELECT DISTINCT "itemId" FROM "item_usages"
               WHERE "userId" = $1 AND "skillArea" = $2 AND "questionType" = $3"#,
        )
        .bind(&key.user_id)
        .bind(key.skill_area.as_str())
        .bind(&key.question_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn recent_item_ids(
        &self,
        key: &SkillKey,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<HashSet<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"SELECT "itemId" FROM "item_usages"
               WHERE "userId" = $1 AND "skillArea" = $2 AND "questionType" = $3
                 AND "usedAt" >= $4
               ORDER BY "usedAt" DESC LIMIT $5"#,
        )
        .bind(&key.user_id)
        .bind(key.skill_area.as_str())
        .bind(&key.question_type)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn recent_scores(&self, key: &SkillKey, limit: usize) -> Result<Vec<f64>, StoreError> {
        let mut scores: Vec<f64> = sqlx::query_scalar(
            r#"SELECT "score" FROM "attempt_scores"
               WHERE "userId" = $1 AND "skillArea" = $2 AND "questionType" = $3
               ORDER BY "id" DESC LIMIT $4"#,
        )
        .bind(&key.user_id)
        .bind(key.skill_area.as_str())
        .bind(&key.question_type)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        scores.reverse();
        Ok(scores)
    }

    async fn commit_attempt(&self, write: &AttemptWrite) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = level_update(&write.level, write.expected_version)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"INSERT INTO "attempt_scores"
               ("userId", "skillArea", "questionType", "score", "attemptedAt")
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&write.level.user_id)
        .bind(write.level.skill_area.as_str())
        .bind(&write.level.question_type)
        .bind(write.score)
        .bind(write.occurred_at)
        .execute(&mut *tx)
        .await?;

        if let Some(usage) = write.usage.as_ref() {
            sqlx::query(
                r#"INSERT INTO "item_usages"
                   ("id", "userId", "itemId", "skillArea", "questionType", "score", "usedAt")
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(&usage.id)
            .bind(&usage.user_id)
            .bind(&usage.item_id)
            .bind(usage.skill_area.as_str())
            .bind(&usage.question_type)
            .bind(usage.score)
            .bind(usage.used_at)
            .execute(&mut *tx)
            .await?;

            // EMA against the row's current value so concurrent usages compose.
            sqlx::query(
                r#"UPDATE "practice_items"
                   SET "timesUsed" = "timesUsed" + 1,
                       "qualityScore" = LEAST(100, GREATEST(0,
                           COALESCE("qualityScore" + $2 * ($3 - "qualityScore"), $3)))
                   WHERE "id" = $1"#,
            )
            .bind(&usage.item_id)
            .bind(write.quality_smoothing.clamp(0.0, 1.0))
            .bind(usage.score.clamp(0.0, 100.0))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(date) = write.activity_date {
            sqlx::query(
                r#"INSERT INTO "activity_days" ("userId", "activityDate", "sessionCount")
                   VALUES ($1, $2, 1)
                   ON CONFLICT ("userId", "activityDate") DO UPDATE SET
                     "sessionCount" = "activity_days"."sessionCount" + 1"#,
            )
            .bind(&write.level.user_id)
            .bind(date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn activity_days(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActivityDay>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT "activityDate", "sessionCount" FROM "activity_days"
               WHERE "userId" = $1 AND "activityDate" BETWEEN $2 AND $3
                 AND "sessionCount" > 0"#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ActivityDay, StoreError> {
                Ok(ActivityDay::new(
                    row.try_get("activityDate")?,
                    row.try_get("sessionCount")?,
                ))
            })
            .collect()
    }

    async fn user_timezone(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let tz: Option<String> = sqlx::query_scalar(
            r#"SELECT "timezone" FROM "user_preferences" WHERE "userId" = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tz)
    }

    async fn set_user_timezone(&self, user_id: &str, timezone: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO "user_preferences" ("userId", "timezone", "updatedAt")
               VALUES ($1, $2, NOW())
               ON CONFLICT ("userId") DO UPDATE SET
                 "timezone" = EXCLUDED."timezone", "updatedAt" = NOW()"#,
        )
        .bind(user_id)
        .bind(timezone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
