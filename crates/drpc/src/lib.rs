//! # drpc
//!
//! The core of a remote-procedure-call framework: providers publish
//! themselves in a hierarchical coordination store, consumers get the full
//! provider list pushed to them on every change, and method calls on local
//! stand-ins travel to a remote process and back.
//!
//! ## Quick Start
//!
//! ```rust
//! use drpc::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RegistryError> {
//! let store = MemoryStore::new();
//! let publisher = Arc::new(EventPublisher::new());
//! let directory = Arc::new(ProviderDirectory::new());
//! publisher.subscribe(directory.clone());
//!
//! let registry = StoreRegistry::new(Arc::new(store.connect()), publisher);
//! registry.subscribe(&RegistryEntry::new("shop", "billing", "10.0.0.2", 0)).await?;
//! registry.register(&RegistryEntry::new("billing-app", "billing", "10.0.0.7", 7001)).await?;
//!
//! let providers = registry.query_providers("billing").await?;
//! assert_eq!(providers.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`drpc_core`] - registry entries, errors, configuration, the event
//!   publisher, provider directory and local caches
//! - [`drpc_registry`] - the coordination store capability, an in-memory
//!   store and the registry with its watch protocol
//! - [`drpc_rpc`] - invocation proxies, the pending call table, response
//!   dispatch and the server-side exporter

pub use drpc_core as core;
pub use drpc_registry as registry;
pub use drpc_rpc as rpc;

/// Prelude module for convenient imports.
///
/// ```rust
/// use drpc::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use drpc_core::prelude::*;
    pub use drpc_core::{InvocationConfig, ListenerError, ListenerId, RegistryConfig};

    // Registry
    pub use drpc_registry::{
        CreateMode, HierarchicalStore, MemorySession, MemoryStore, RegistryPaths,
        ServiceRegistry, StoreRegistry, SubscriptionState,
    };

    // Invocation
    pub use drpc_rpc::{
        CorrelationId, Dispatch, InvocationProxy, LoopbackChannel, MethodTable,
        PendingCallTable, ProxyConfig, RemoteService, ResponseDispatcher, RpcChannel,
        ServiceExporter, ServiceInvoker,
    };
}
