use std::sync::Arc;
use tollgate_engine::EntitlementServices;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<EntitlementServices>,
}

impl AppState {
    pub fn new(services: EntitlementServices) -> Self {
        Self {
            services: Arc::new(services),
        }
    }
}
