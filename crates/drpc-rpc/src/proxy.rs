//! Client-side stand-ins for remote services.
//!
//! A remote service is described by a type implementing [`RemoteService`]:
//! its name, the methods it may call, and a constructor taking a
//! [`ServiceInvoker`]. Each of its methods is a thin wrapper around
//! [`ServiceInvoker::invoke`], which does the actual interception:
//!
//! ```rust,ignore
//! struct Greeter { invoker: ServiceInvoker }
//!
//! impl RemoteService for Greeter {
//!     const NAME: &'static str = "Greeter";
//!     const METHODS: &'static [&'static str] = &["greet"];
//!     fn from_invoker(invoker: ServiceInvoker) -> Self { Self { invoker } }
//! }
//!
//! impl Greeter {
//!     async fn greet(&self, name: &str) -> RpcResult<String> {
//!         self.invoker.invoke("greet", (name,)).await
//!     }
//! }
//!
//! let greeter: Greeter = proxy.get_proxy();
//! ```

use crate::channel::RpcChannel;
use crate::pending::PendingCallTable;
use crate::protocol::{CorrelationId, RpcRequest};
use drpc_core::{InvocationConfig, RpcError, RpcResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Default deadline for each call.
    pub timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::from(&InvocationConfig::default())
    }
}

impl From<&InvocationConfig> for ProxyConfig {
    fn from(config: &InvocationConfig) -> Self {
        Self {
            timeout: config.timeout(),
        }
    }
}

/// A service interface callable through an [`InvocationProxy`].
pub trait RemoteService: Sized {
    /// Service name sent in every request.
    const NAME: &'static str;
    /// Methods the interface declares. Anything else fails locally.
    const METHODS: &'static [&'static str];

    fn from_invoker(invoker: ServiceInvoker) -> Self;
}

/// Builds remote service stand-ins over one channel.
#[derive(Clone)]
pub struct InvocationProxy {
    channel: Arc<dyn RpcChannel>,
    pending: Arc<PendingCallTable>,
    config: ProxyConfig,
}

impl InvocationProxy {
    /// `pending` must be the table the channel's response dispatcher completes.
    pub fn new(
        channel: Arc<dyn RpcChannel>,
        pending: Arc<PendingCallTable>,
        config: ProxyConfig,
    ) -> Self {
        Self {
            channel,
            pending,
            config,
        }
    }

    pub fn get_proxy<S: RemoteService>(&self) -> S {
        S::from_invoker(self.invoker(S::NAME, S::METHODS))
    }

    pub fn invoker(&self, service: &'static str, methods: &'static [&'static str]) -> ServiceInvoker {
        ServiceInvoker {
            proxy: self.clone(),
            service,
            methods,
        }
    }

    pub fn pending(&self) -> &Arc<PendingCallTable> {
        &self.pending
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Removes a call's slot when the caller stops waiting, however that happens.
struct SlotGuard<'a> {
    pending: &'a PendingCallTable,
    id: CorrelationId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

/// The call interceptor bound to one remote service.
#[derive(Clone)]
pub struct ServiceInvoker {
    proxy: InvocationProxy,
    service: &'static str,
    methods: &'static [&'static str],
}

impl ServiceInvoker {
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Call `method` with the proxy's default timeout.
    ///
    /// Arguments are serialized as one JSON value; pass a tuple for
    /// positional arguments and `()` for none.
    pub async fn invoke<A, R>(&self, method: &str, args: A) -> RpcResult<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.invoke_with_timeout(method, args, self.proxy.config.timeout)
            .await
    }

    pub async fn invoke_with_timeout<A, R>(
        &self,
        method: &str,
        args: A,
        timeout: Duration,
    ) -> RpcResult<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        if !self.methods.iter().any(|declared| *declared == method) {
            return Err(RpcError::UnknownMethod {
                service: self.service.to_string(),
                method: method.to_string(),
            });
        }
        if !self.proxy.channel.is_open() {
            return Err(RpcError::ChannelClosed);
        }

        let args = serde_json::to_value(args).map_err(|e| RpcError::Serialization(e.to_string()))?;
        let correlation_id = CorrelationId::new();
        let frame = RpcRequest::new(correlation_id, self.service, method, args).to_frame()?;

        let pending = self.proxy.pending.as_ref();
        let mut slot = pending.register(correlation_id, self.service, method)?;
        let _guard = SlotGuard {
            pending,
            id: correlation_id,
        };

        debug!(
            correlation_id = %correlation_id,
            service = self.service,
            method = %method,
            "Sending request"
        );
        self.proxy.channel.send(frame).await?;

        let outcome = match tokio::time::timeout(timeout, &mut slot).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(RpcError::ChannelClosed),
            Err(_) => {
                if pending.remove(correlation_id) {
                    warn!(
                        correlation_id = %correlation_id,
                        service = self.service,
                        method = %method,
                        timeout_ms = timeout.as_millis() as u64,
                        "Call timed out"
                    );
                    return Err(RpcError::Timeout {
                        service: self.service.to_string(),
                        method: method.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                // A response removed the slot first and is being handed over.
                match slot.await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(RpcError::ChannelClosed),
                }
            }
        };

        let value = outcome.map_err(RpcError::Remote)?;
        serde_json::from_value(value).map_err(|e| {
            RpcError::Serialization(format!(
                "cannot decode result of {}.{}: {}",
                self.service, method, e
            ))
        })
    }
}
