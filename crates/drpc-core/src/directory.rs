//! Routing view of the providers of every observed service.

use crate::entry::RegistryEntry;
use crate::error::ListenerError;
use crate::event::{ServiceUpdateEvent, ServiceUpdateListener};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Provider lists kept current from published service-update events.
///
/// Each update swaps in a new immutable list, so a reader choosing a call
/// target holds a complete snapshot even while the next update lands.
#[derive(Default)]
pub struct ProviderDirectory {
    services: RwLock<HashMap<String, Arc<[RegistryEntry]>>>,
}

impl ProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the providers of a service; empty if none were seen.
    pub fn providers(&self, service_name: &str) -> Arc<[RegistryEntry]> {
        self.services
            .read()
            .get(service_name)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Services that have received at least one update.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Replace a service's provider list wholesale.
    pub fn replace(&self, service_name: &str, providers: Vec<RegistryEntry>) {
        let providers: Arc<[RegistryEntry]> = Arc::from(providers);
        self.services
            .write()
            .insert(service_name.to_string(), providers);
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl ServiceUpdateListener for ProviderDirectory {
    fn on_service_update(&self, event: &ServiceUpdateEvent) -> Result<(), ListenerError> {
        self.replace(&event.service_name, event.providers.clone());
        Ok(())
    }
}
