use sqlx::PgPool;

use crate::error::StoreError;

const MIGRATIONS: [(&str, &str); 2] = [
    (
        "001_progression_schema",
        include_str!("../../sql/001_progression_schema.sql"),
    ),
    (
        "002_attempt_scores",
        include_str!("../../sql/002_attempt_scores.sql"),
    ),
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    tracing::info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" SERIAL PRIMARY KEY,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TIMESTAMP NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> =
        sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
            .fetch_all(pool)
            .await?;

    let mut applied_count = 0;

    for (name, sql) in MIGRATIONS {
        if applied.iter().any(|a| a == name) {
            tracing::debug!(migration = name, "Already applied, skipping");
            continue;
        }

        tracing::info!(migration = name, "Applying migration...");

        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Migration {
                name: name.to_string(),
                source: e,
            })?;

        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(name)
            .execute(pool)
            .await?;

        applied_count += 1;
    }

    if applied_count > 0 {
        tracing::info!(count = applied_count, "Database migrations completed");
    } else {
        tracing::info!("Database is up to date, no migrations needed");
    }

    Ok(())
}
