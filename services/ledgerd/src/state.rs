use std::sync::Arc;

use ledger::{Service, ServiceConfig};

use crate::config::AppConfig;

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
}

impl AppState {
    pub fn new(cfg: &AppConfig) -> Self {
        let service = Service::new(ServiceConfig {
            require_auth: cfg.require_auth,
            users: cfg.users.clone(),
            signing_key: Some(cfg.signing_key.clone()),
        });
        Self {
            service: Arc::new(service),
        }
    }

    #[cfg(test)]
    pub fn from_service(service: Service) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
