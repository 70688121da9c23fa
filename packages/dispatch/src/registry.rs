//! Service lookup.
//!
//! The dispatcher never holds services directly; it asks a
//! [`ServiceRegistry`] for one per exchange. [`MemoryRegistry`] is the
//! in-process implementation built by the definition loader and used by the
//! tests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::service::Service;

/// Resolves the service that should handle an exchange.
///
/// An explicit `service_id` takes precedence over `type_name`. Returns `None`
/// when neither leads to a known service.
pub trait ServiceRegistry: Send + Sync + 'static {
    fn get_service(&self, type_name: Option<&str>, service_id: Option<&str>) -> Option<Arc<Service>>;
}

/// Services keyed by id, plus a schema table mapping types to service ids.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    services: HashMap<String, Arc<Service>>,
    schemas: HashMap<String, String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service, replacing any earlier one with the same id.
    pub fn insert(mut self, service: Service) -> Self {
        self.services.insert(service.id().to_string(), Arc::new(service));
        self
    }

    /// Route requests of `type_name` to `service_id` when they name no service.
    pub fn map_type(mut self, type_name: impl Into<String>, service_id: impl Into<String>) -> Self {
        self.schemas.insert(type_name.into(), service_id.into());
        self
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.services.contains_key(service_id)
    }

    /// Service ids in sorted order.
    pub fn service_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.services.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl ServiceRegistry for MemoryRegistry {
    fn get_service(&self, type_name: Option<&str>, service_id: Option<&str>) -> Option<Arc<Service>> {
        let id = match service_id {
            Some(id) => id,
            None => self.schemas.get(type_name?)?.as_str(),
        };
        self.services.get(id).cloned()
    }
}
