//! Process-local registration caches.
//!
//! A provider process keeps a server-side cache of what it registered, a
//! consumer process a client-side cache of what it subscribed to. Both are
//! keyed by application name. They are an inspection aid and a fast lookup,
//! not a source of truth, so a stale entry is harmless.

use crate::entry::RegistryEntry;
use dashmap::DashMap;
use std::fmt;

/// Which side of the call a cache belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
    /// Entries this process subscribed with.
    Client,
    /// Entries this process registered as a provider.
    Server,
}

impl fmt::Display for CacheRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheRole::Client => write!(f, "client"),
            CacheRole::Server => write!(f, "server"),
        }
    }
}

/// Map from application name to its most recent registry entry.
#[derive(Debug)]
pub struct LocalCache {
    role: CacheRole,
    entries: DashMap<String, RegistryEntry>,
}

impl LocalCache {
    pub fn new(role: CacheRole) -> Self {
        Self {
            role,
            entries: DashMap::new(),
        }
    }

    pub fn client() -> Self {
        Self::new(CacheRole::Client)
    }

    pub fn server() -> Self {
        Self::new(CacheRole::Server)
    }

    pub fn role(&self) -> CacheRole {
        self.role
    }

    /// Store an entry under its application name, returning the previous one.
    pub fn put(&self, entry: RegistryEntry) -> Option<RegistryEntry> {
        self.entries.insert(entry.application_name.clone(), entry)
    }

    pub fn get(&self, application_name: &str) -> Option<RegistryEntry> {
        self.entries
            .get(application_name)
            .map(|r| r.value().clone())
    }

    pub fn remove(&self, application_name: &str) -> Option<RegistryEntry> {
        self.entries
            .remove(application_name)
            .map(|(_, entry)| entry)
    }

    pub fn contains(&self, application_name: &str) -> bool {
        self.entries.contains_key(application_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Application names currently cached, sorted.
    pub fn application_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}
