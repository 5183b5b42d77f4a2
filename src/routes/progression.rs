use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::progression::{AttemptInput, SkillArea};
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/levels", get(list_levels))
        .route("/levels/:skill_area/:question_type", put(reset_level))
        .route(
            "/levels/:skill_area/:question_type/attempts",
            post(record_attempt),
        )
        .route("/prompts/next", get(next_prompt))
        .route("/progress", get(progress_summary))
        .route("/timezone", put(set_timezone))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptRequest {
    score: f64,
    #[serde(default)]
    item_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetLevelRequest {
    numeric_level: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextPromptQuery {
    skill_area: String,
    question_type: String,
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    #[serde(default)]
    weeks: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TimezoneRequest {
    timezone: String,
}

#[derive(Debug, Serialize)]
struct TimezoneData {
    timezone: String,
}

fn parse_skill_area(raw: &str) -> Result<SkillArea, AppError> {
    SkillArea::parse(raw).ok_or_else(|| AppError::validation(format!("unknown skill area: {raw}")))
}

fn require_question_type(raw: &str) -> Result<&str, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("question type must not be empty"));
    }
    Ok(trimmed)
}

async fn list_levels(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, AppError> {
    let levels = state.service().list_user_levels(&user_id).await?;
    Ok(ok(levels).into_response())
}

async fn record_attempt(
    State(state): State<AppState>,
    Path((user_id, skill_area, question_type)): Path<(String, String, String)>,
    Json(body): Json<AttemptRequest>,
) -> Result<Response, AppError> {
    let input = AttemptInput {
        user_id,
        skill_area: parse_skill_area(&skill_area)?,
        question_type: require_question_type(&question_type)?.to_string(),
        score: body.score,
        item_id: body.item_id.filter(|id| !id.trim().is_empty()),
        occurred_at: Utc::now(),
    };

    let outcome = state.service().record_attempt(input).await?;
    Ok(ok(outcome).into_response())
}

async fn reset_level(
    State(state): State<AppState>,
    Path((user_id, skill_area, question_type)): Path<(String, String, String)>,
    Json(body): Json<ResetLevelRequest>,
) -> Result<Response, AppError> {
    let level = state
        .service()
        .reset_user_level(
            &user_id,
            parse_skill_area(&skill_area)?,
            require_question_type(&question_type)?,
            body.numeric_level,
        )
        .await?;
    Ok(ok(level).into_response())
}

async fn next_prompt(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<NextPromptQuery>,
) -> Result<Response, AppError> {
    let selection = state
        .service()
        .select_prompt_for_user(
            &user_id,
            parse_skill_area(&query.skill_area)?,
            require_question_type(&query.question_type)?,
        )
        .await?;
    let prompt = selection.into_result()?;
    Ok(ok(prompt).into_response())
}

async fn progress_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ProgressQuery>,
) -> Result<Response, AppError> {
    let summary = state
        .service()
        .progress_summary(&user_id, query.weeks)
        .await?;
    Ok(ok(summary).into_response())
}

async fn set_timezone(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<TimezoneRequest>,
) -> Result<Response, AppError> {
    let tz = state
        .service()
        .set_user_timezone(&user_id, &body.timezone)
        .await?;
    Ok(ok(TimezoneData {
        timezone: tz.name().to_string(),
    })
    .into_response())
}
