use perpdata_engine::ToolService;
use std::time::Instant;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    pub service: ToolService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: ToolService) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}
