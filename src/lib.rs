pub mod config;
pub mod error;
pub mod logging;
pub mod progression;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::progression::ProgressionService;
use crate::state::AppState;

pub fn create_app(service: Arc<ProgressionService>) -> axum::Router {
    routes::router(AppState::new(service))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
