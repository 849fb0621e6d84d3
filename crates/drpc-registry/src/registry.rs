//! Service registry over a hierarchical store.

use crate::paths::RegistryPaths;
use crate::store::{CreateMode, HierarchicalStore};
use crate::watch::{self, SubscriptionRecord, SubscriptionState, WatchLoop};
use async_trait::async_trait;
use dashmap::DashMap;
use drpc_core::{
    EventPublisher, LocalCache, RegistryConfig, RegistryEntry, RegistryError, RegistryResult,
    Role, StoreError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Registration and discovery of services.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Publish a provider. Replaces a previous registration at the same address.
    async fn register(&self, entry: &RegistryEntry) -> RegistryResult<()>;

    /// Withdraw a provider. Withdrawing an absent provider succeeds.
    async fn unregister(&self, entry: &RegistryEntry) -> RegistryResult<()>;

    /// Record a consumer and start pushing provider-list updates for its
    /// service to the event publisher.
    async fn subscribe(&self, entry: &RegistryEntry) -> RegistryResult<()>;

    /// Remove a consumer. Updates stop at the next provider change.
    async fn unsubscribe(&self, entry: &RegistryEntry) -> RegistryResult<()>;

    /// Current providers of a service; empty if the service is unknown.
    async fn query_providers(&self, service_name: &str) -> RegistryResult<Vec<RegistryEntry>>;

    /// Current consumers of a service; empty if the service is unknown.
    async fn query_consumers(&self, service_name: &str) -> RegistryResult<Vec<RegistryEntry>>;
}

/// [`ServiceRegistry`] backed by any [`HierarchicalStore`].
///
/// Cloning is cheap; clones share the store, caches and subscriptions.
#[derive(Clone)]
pub struct StoreRegistry {
    store: Arc<dyn HierarchicalStore>,
    paths: RegistryPaths,
    publisher: Arc<EventPublisher>,
    server_cache: Arc<LocalCache>,
    client_cache: Arc<LocalCache>,
    subscriptions: Arc<DashMap<String, SubscriptionRecord>>,
    next_generation: Arc<AtomicU64>,
}

impl StoreRegistry {
    pub fn new(store: Arc<dyn HierarchicalStore>, publisher: Arc<EventPublisher>) -> Self {
        Self::with_paths(RegistryPaths::default(), store, publisher)
    }

    pub fn with_config(
        config: &RegistryConfig,
        store: Arc<dyn HierarchicalStore>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self::with_paths(RegistryPaths::from_config(config), store, publisher)
    }

    fn with_paths(
        paths: RegistryPaths,
        store: Arc<dyn HierarchicalStore>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            store,
            paths,
            publisher,
            server_cache: Arc::new(LocalCache::server()),
            client_cache: Arc::new(LocalCache::client()),
            subscriptions: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Share caches with other components of the process.
    pub fn with_caches(mut self, server_cache: Arc<LocalCache>, client_cache: Arc<LocalCache>) -> Self {
        self.server_cache = server_cache;
        self.client_cache = client_cache;
        self
    }

    pub fn server_cache(&self) -> &Arc<LocalCache> {
        &self.server_cache
    }

    pub fn client_cache(&self) -> &Arc<LocalCache> {
        &self.client_cache
    }

    pub fn paths(&self) -> &RegistryPaths {
        &self.paths
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    pub(crate) fn store(&self) -> &Arc<dyn HierarchicalStore> {
        &self.store
    }

    /// State of the subscription made with `entry`, if any.
    pub fn subscription_state(&self, entry: &RegistryEntry) -> Option<SubscriptionState> {
        self.subscriptions
            .get(&self.paths.consumer_node(entry))
            .map(|record| record.state.clone())
    }

    /// Consumer paths of subscriptions that stopped on an error, with the reason.
    pub fn failed_subscriptions(&self) -> Vec<(String, String)> {
        let mut failed: Vec<_> = self
            .subscriptions
            .iter()
            .filter_map(|record| match &record.state {
                SubscriptionState::Failed { reason } => {
                    Some((record.key().clone(), reason.clone()))
                }
                _ => None,
            })
            .collect();
        failed.sort();
        failed
    }

    pub(crate) fn is_current(&self, consumer_path: &str, generation: u64) -> bool {
        self.subscriptions
            .get(consumer_path)
            .map(|record| record.generation == generation)
            .unwrap_or(false)
    }

    /// Update a subscription's state unless a newer subscription owns it.
    pub(crate) fn set_state(&self, consumer_path: &str, generation: u64, state: SubscriptionState) {
        if let Some(mut record) = self.subscriptions.get_mut(consumer_path) {
            if record.generation == generation {
                record.state = state;
            }
        }
    }

    async fn ensure_node(&self, path: &str) -> RegistryResult<()> {
        if self.store.exists_node(path).await? {
            return Ok(());
        }
        match self.store.create_node(path, &[], CreateMode::Persistent).await {
            Ok(()) | Err(StoreError::NodeExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete then create an ephemeral node, so the payload is always fresh.
    async fn replace_ephemeral(&self, path: &str, entry: &RegistryEntry) -> RegistryResult<()> {
        let payload = entry.to_payload()?;
        if self.store.exists_node(path).await? {
            match self.store.delete_node(path).await {
                Ok(()) | Err(StoreError::NoNode(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.store
            .create_node(path, &payload, CreateMode::Ephemeral)
            .await?;
        Ok(())
    }

    async fn delete_if_present(&self, path: &str) -> RegistryResult<()> {
        match self.store.delete_node(path).await {
            Ok(()) | Err(StoreError::NoNode(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Decode every child of a branch.
    ///
    /// A missing branch reads as empty. A child deleted between the listing
    /// and the read is skipped.
    pub(crate) async fn query_branch(&self, branch: &str) -> RegistryResult<Vec<RegistryEntry>> {
        let children = match self.store.list_children(branch).await {
            Ok(children) => children,
            Err(StoreError::NoNode(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::with_capacity(children.len());
        for child in children {
            let path = format!("{}/{}", branch, child);
            let payload = match self.store.get_node_data(&path).await {
                Ok(payload) => payload,
                Err(StoreError::NoNode(_)) => {
                    debug!(path = %path, "Node vanished while listing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let entry = RegistryEntry::from_payload(&payload).map_err(|e| match e {
                RegistryError::Serialization(reason) => {
                    RegistryError::Serialization(format!("{}: {}", path, reason))
                }
                other => other,
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[async_trait]
impl ServiceRegistry for StoreRegistry {
    #[instrument(skip(self, entry), fields(service = %entry.service_name, address = %entry.address()))]
    async fn register(&self, entry: &RegistryEntry) -> RegistryResult<()> {
        entry.validate(Role::Provider)?;
        self.ensure_node(self.paths.root()).await?;

        let path = self.paths.provider_node(entry);
        self.replace_ephemeral(&path, entry).await?;
        self.server_cache.put(entry.clone());

        info!(path = %path, "Registered provider");
        Ok(())
    }

    #[instrument(skip(self, entry), fields(service = %entry.service_name, address = %entry.address()))]
    async fn unregister(&self, entry: &RegistryEntry) -> RegistryResult<()> {
        self.server_cache.remove(&entry.application_name);
        let path = self.paths.provider_node(entry);
        self.delete_if_present(&path).await?;

        info!(path = %path, "Unregistered provider");
        Ok(())
    }

    #[instrument(skip(self, entry), fields(service = %entry.service_name, address = %entry.address()))]
    async fn subscribe(&self, entry: &RegistryEntry) -> RegistryResult<()> {
        entry.validate(Role::Consumer)?;
        self.ensure_node(self.paths.root()).await?;

        let provider_branch = self.paths.provider_branch(&entry.service_name);
        self.ensure_node(&provider_branch).await?;

        let consumer_path = self.paths.consumer_node(entry);
        self.replace_ephemeral(&consumer_path, entry).await?;

        // Armed before returning, so a change right after subscribe is seen.
        let first_watch = watch::arm(self.store.as_ref(), &provider_branch).await?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.insert(
            consumer_path.clone(),
            SubscriptionRecord {
                generation,
                state: SubscriptionState::Active,
            },
        );

        let watch_loop = WatchLoop {
            registry: self.clone(),
            consumer: entry.clone(),
            consumer_path: consumer_path.clone(),
            provider_branch,
            generation,
        };
        tokio::spawn(watch_loop.run(first_watch));

        self.client_cache.put(entry.clone());
        info!(path = %consumer_path, generation, "Subscribed");
        Ok(())
    }

    #[instrument(skip(self, entry), fields(service = %entry.service_name, address = %entry.address()))]
    async fn unsubscribe(&self, entry: &RegistryEntry) -> RegistryResult<()> {
        let path = self.paths.consumer_node(entry);
        self.delete_if_present(&path).await?;
        self.client_cache.remove(&entry.application_name);

        info!(path = %path, "Unsubscribed");
        Ok(())
    }

    async fn query_providers(&self, service_name: &str) -> RegistryResult<Vec<RegistryEntry>> {
        self.query_branch(&self.paths.provider_branch(service_name))
            .await
    }

    async fn query_consumers(&self, service_name: &str) -> RegistryResult<Vec<RegistryEntry>> {
        self.query_branch(&self.paths.consumer_branch(service_name))
            .await
    }
}
