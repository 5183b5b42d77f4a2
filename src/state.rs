use std::sync::Arc;
use std::time::Instant;

use crate::progression::ProgressionService;

#[derive(Clone)]
pub struct AppState {
    service: Arc<ProgressionService>,
    started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<ProgressionService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }

    pub fn service(&self) -> &ProgressionService {
        &self.service
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
