use std::sync::{PoisonError, RwLock};

use tracing::info;

use super::types::{Service, ServiceId};
use crate::error::{Error, Result};

/// In-memory service catalog, safe to share between tasks.
///
/// Listing order is registration order.
#[derive(Debug, Default)]
pub struct ServiceCatalog {
    services: RwLock<Vec<Service>>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service`, replacing any entry with the same id in place.
    pub fn add(&self, service: Service) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            service_id = %service.id,
            name = %service.name,
            image_id = %service.image_id,
            "service registered"
        );
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(existing) => *existing = service,
            None => services.push(service),
        }
    }

    pub fn list(&self) -> Vec<Service> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &ServiceId) -> Result<Service> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| &s.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("service", id.to_string()))
    }

    /// First service whose label name equals `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Service> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }
}
