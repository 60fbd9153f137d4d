//! Shared application state
//!
//! Estado compartido que se pasa a través del router de Axum.

use std::sync::Arc;

use crate::config::{DispatchSettings, EnvironmentConfig};
use crate::repositories::DispatchRepository;
use crate::services::DispatchService;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn DispatchRepository>,
    pub dispatcher: Arc<DispatchService>,
    pub config: EnvironmentConfig,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn DispatchRepository>,
        settings: DispatchSettings,
        config: EnvironmentConfig,
    ) -> Self {
        let dispatcher = Arc::new(DispatchService::new(repository.clone(), settings));
        Self {
            repository,
            dispatcher,
            config,
        }
    }
}
