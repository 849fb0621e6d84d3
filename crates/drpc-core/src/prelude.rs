//! Convenience re-exports for the common drpc core types.

pub use crate::cache::{CacheRole, LocalCache};
pub use crate::config::DrpcConfig;
pub use crate::directory::ProviderDirectory;
pub use crate::entry::{RegistryEntry, Role};
pub use crate::error::{RegistryError, RegistryResult, RemoteFault, RpcError, RpcResult, StoreError};
pub use crate::event::{EventPublisher, ServiceUpdateEvent, ServiceUpdateListener};
