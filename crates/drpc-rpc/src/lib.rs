//! # drpc RPC
//!
//! Turns a method call on a local stand-in into a request over an
//! [`RpcChannel`] and suspends the caller until the matching response
//! arrives or its deadline passes.
//!
//! - [`InvocationProxy`] / [`ServiceInvoker`] - the client-side interceptor
//! - [`PendingCallTable`] - correlation id to suspended caller
//! - [`ResponseDispatcher`] - completes pending calls from inbound frames
//! - [`ServiceExporter`] - the server-side dispatch table
//! - [`LoopbackChannel`] - an in-process channel joining the two
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let pending = Arc::new(PendingCallTable::new(config.invocation.max_pending_calls));
//! let dispatcher = Arc::new(ResponseDispatcher::new(pending.clone()));
//! let channel = Arc::new(LoopbackChannel::new(exporter, dispatcher));
//! let proxy = InvocationProxy::new(channel, pending, ProxyConfig::from(&config.invocation));
//! ```

pub mod channel;
pub mod dispatcher;
pub mod exporter;
pub mod pending;
pub mod protocol;
pub mod proxy;

pub use channel::{LoopbackChannel, RpcChannel};
pub use dispatcher::{Dispatch, ResponseDispatcher};
pub use exporter::{MethodTable, ServiceExporter};
pub use pending::{CallOutcome, PendingCallTable};
pub use protocol::{CorrelationId, Outcome, RpcRequest, RpcResponse};
pub use proxy::{InvocationProxy, ProxyConfig, RemoteService, ServiceInvoker};
