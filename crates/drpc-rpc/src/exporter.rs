//! Server-side dispatch of request frames to service implementations.
//!
//! Each exported service is a [`MethodTable`] of named async handlers. The
//! handler's argument type is decoded from the request's JSON arguments:
//! tuples from positional arrays, `()` from `null`, structs from objects.

use crate::protocol::{RpcRequest, RpcResponse};
use drpc_core::{RemoteFault, RpcResult};
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RemoteFault>> + Send + Sync>;

/// Method name to handler.
#[derive(Default, Clone)]
pub struct MethodTable {
    methods: HashMap<String, Handler>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. A handler registered under an existing name replaces it.
    pub fn method<A, R, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RemoteFault>> + Send + 'static,
    {
        let erased: Handler = Arc::new(move |args: Value| -> BoxFuture<'static, Result<Value, RemoteFault>> {
            let args: A = match serde_json::from_value(args) {
                Ok(args) => args,
                Err(e) => {
                    return future::ready(Err(RemoteFault::bad_arguments(e.to_string()))).boxed()
                }
            };
            let call = handler(args);
            async move {
                let result = call.await?;
                serde_json::to_value(result).map_err(|e| {
                    RemoteFault::internal(format!("result serialization failed: {}", e))
                })
            }
            .boxed()
        });
        self.methods.insert(name.into(), erased);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn handler(&self, name: &str) -> Option<Handler> {
        self.methods.get(name).cloned()
    }
}

/// Registry of services this process serves.
#[derive(Default)]
pub struct ServiceExporter {
    services: RwLock<HashMap<String, Arc<MethodTable>>>,
}

impl ServiceExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `table` under `service_name`, returning the table it replaced.
    pub fn export(&self, service_name: impl Into<String>, table: MethodTable) -> Option<Arc<MethodTable>> {
        let service_name = service_name.into();
        debug!(service = %service_name, methods = ?table.method_names(), "Exporting service");
        self.services.write().insert(service_name, Arc::new(table))
    }

    pub fn unexport(&self, service_name: &str) -> bool {
        self.services.write().remove(service_name).is_some()
    }

    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run one method.
    pub async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, RemoteFault> {
        let table = self
            .services
            .read()
            .get(service)
            .cloned()
            .ok_or_else(|| RemoteFault::unknown_service(service))?;
        let handler = table
            .handler(method)
            .ok_or_else(|| RemoteFault::unknown_method(service, method))?;
        handler(args).await
    }

    /// Decode a request frame, run it and encode the response frame.
    ///
    /// Fails only when the request frame itself is unreadable, since there is
    /// then no correlation id to answer to.
    #[instrument(skip(self, frame), fields(len = frame.len()))]
    pub async fn handle(&self, frame: &[u8]) -> RpcResult<Vec<u8>> {
        let request = RpcRequest::from_frame(frame)?;
        let RpcRequest {
            correlation_id,
            service,
            method,
            args,
        } = request;

        let outcome = self.call(&service, &method, args).await;
        if let Err(fault) = &outcome {
            warn!(
                correlation_id = %correlation_id,
                service = %service,
                method = %method,
                "Call failed: {}",
                fault
            );
        }
        RpcResponse::new(correlation_id, outcome).to_frame()
    }
}
