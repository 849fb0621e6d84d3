//! # drpc Registry
//!
//! Registration of providers and consumers in a hierarchical coordination
//! store, and push-based discovery of provider lists.
//!
//! # Layout
//!
//! ```text
//! {root}/{service}/providers/{ip}:{port}   ephemeral, payload = RegistryEntry JSON
//! {root}/{service}/consumers/{ip}:{port}   ephemeral, payload = RegistryEntry JSON
//! ```
//!
//! # Discovery
//!
//! [`StoreRegistry::subscribe`] writes the consumer node and arms a one-shot
//! child watch on the provider branch. Each time it fires, a per-subscription
//! loop checks that the consumer node still exists, re-reads the full provider
//! list, publishes a [`drpc_core::ServiceUpdateEvent`] and re-arms the watch.
//! Deleting the consumer node (`unsubscribe`) ends the loop at the next firing.
//!
//! # Example
//!
//! ```rust,ignore
//! use drpc_core::{EventPublisher, RegistryEntry};
//! use drpc_registry::{MemoryStore, ServiceRegistry, StoreRegistry};
//!
//! let store = MemoryStore::new();
//! let registry = StoreRegistry::new(Arc::new(store.connect()), Arc::new(EventPublisher::new()));
//!
//! registry.register(&RegistryEntry::new("app1", "service1", "127.0.0.1", 1234)).await?;
//! let providers = registry.query_providers("service1").await?;
//! ```

pub mod memory;
pub mod paths;
pub mod registry;
pub mod store;
pub mod watch;

pub use memory::{MemorySession, MemoryStore};
pub use paths::RegistryPaths;
pub use registry::{ServiceRegistry, StoreRegistry};
pub use store::{CreateMode, HierarchicalStore, WatchCallback, WatchEvent, WatchEventKind};
pub use watch::SubscriptionState;
