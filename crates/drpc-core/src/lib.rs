//! # drpc Core
//!
//! Shared building blocks for the drpc service framework:
//!
//! - [`RegistryEntry`] - the record a provider or consumer writes into the
//!   coordination store
//! - [`EventPublisher`] - process-wide fan-out of service-list changes
//! - [`ProviderDirectory`] - a routing view rebuilt wholesale from those events
//! - [`LocalCache`] - per-role map of the entries this process registered
//! - error types and configuration used by every other drpc crate
//!
//! ## Quick Start
//!
//! ```rust
//! use drpc_core::prelude::*;
//!
//! let entry = RegistryEntry::new("billing-app", "billing.Invoices", "10.0.0.7", 7001);
//! assert_eq!(entry.address(), "10.0.0.7:7001");
//!
//! let payload = entry.to_payload().unwrap();
//! assert_eq!(RegistryEntry::from_payload(&payload).unwrap(), entry);
//! ```

pub mod cache;
pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod event;
pub mod prelude;

pub use cache::{CacheRole, LocalCache};
pub use config::{DrpcConfig, InvocationConfig, RegistryConfig};
pub use directory::ProviderDirectory;
pub use entry::{RegistryEntry, Role};
pub use error::*;
pub use event::{EventPublisher, ListenerId, ServiceUpdateEvent, ServiceUpdateListener};
