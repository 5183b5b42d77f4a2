#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};

use lingua_progress::config::EngineConfig;
use lingua_progress::progression::{CefrLevel, PracticeItem, ProgressionService, SkillArea};
use lingua_progress::store::{MemoryStore, ProgressStore};

pub const QUESTION_TYPE: &str = "describe_picture";

pub fn build_service() -> (Arc<MemoryStore>, ProgressionService) {
    let store = Arc::new(MemoryStore::new());
    let service = ProgressionService::new(
        Arc::clone(&store) as Arc<dyn ProgressStore>,
        EngineConfig::default(),
    );
    (store, service)
}

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub fn leveled_item(id: &str, band: CefrLevel) -> PracticeItem {
    PracticeItem {
        id: id.to_string(),
        skill_area: SkillArea::Speaking,
        question_type: QUESTION_TYPE.to_string(),
        cefr_level: Some(band),
        content: serde_json::json!({ "prompt": format!("prompt {id}") }),
        times_used: 0,
        quality_score: None,
        expires_at: None,
    }
}

pub fn static_item(id: &str) -> PracticeItem {
    PracticeItem {
        cefr_level: None,
        ..leveled_item(id, CefrLevel::A1)
    }
}

pub async fn seed(store: &MemoryStore, items: &[PracticeItem]) {
    for item in items {
        store.upsert_item(item).await.expect("seed item");
    }
}

pub fn create_test_app() -> (Arc<MemoryStore>, axum::Router) {
    let (store, service) = build_service();
    (store, lingua_progress::create_app(Arc::new(service)))
}
