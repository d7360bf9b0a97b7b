use std::sync::Arc;
use wayfinder::service::AgentService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AgentService>,
}

impl AppState {
    pub fn new(service: AgentService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
