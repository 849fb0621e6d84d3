//! Transport channel capability.
//!
//! Connection management and framing live outside drpc; a proxy only needs
//! to know whether the channel is open and how to hand it a request frame.
//! Responses come back through a [`ResponseDispatcher`] the transport owns.

use crate::dispatcher::{Dispatch, ResponseDispatcher};
use crate::exporter::ServiceExporter;
use async_trait::async_trait;
use drpc_core::{RpcError, RpcResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An established, full-duplex connection to a remote process.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    fn is_open(&self) -> bool;

    /// Queue a request frame. Returning does not mean the peer received it.
    async fn send(&self, frame: Vec<u8>) -> RpcResult<()>;
}

struct LoopbackInner {
    exporter: Arc<ServiceExporter>,
    dispatcher: Arc<ResponseDispatcher>,
    open: AtomicBool,
    latency_ms: AtomicU64,
    drop_responses: AtomicBool,
    sent: AtomicU64,
}

/// In-process channel that serves requests with a local [`ServiceExporter`].
///
/// Every frame is handled on its own task, so responses can complete out of
/// order. Latency and lost responses can be injected.
#[derive(Clone)]
pub struct LoopbackChannel {
    inner: Arc<LoopbackInner>,
}

impl LoopbackChannel {
    pub fn new(exporter: Arc<ServiceExporter>, dispatcher: Arc<ResponseDispatcher>) -> Self {
        Self {
            inner: Arc::new(LoopbackInner {
                exporter,
                dispatcher,
                open: AtomicBool::new(true),
                latency_ms: AtomicU64::new(0),
                drop_responses: AtomicBool::new(false),
                sent: AtomicU64::new(0),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Arc<ResponseDispatcher> {
        &self.inner.dispatcher
    }

    /// Delay applied before each response is delivered.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Serve requests but never deliver their responses.
    pub fn set_drop_responses(&self, drop: bool) {
        self.inner.drop_responses.store(drop, Ordering::Relaxed);
    }

    /// Frames accepted by `send` so far.
    pub fn sent_count(&self) -> u64 {
        self.inner.sent.load(Ordering::Relaxed)
    }

    /// Close the channel and fail every call still waiting on it.
    pub fn close(&self) {
        if self.inner.open.swap(false, Ordering::SeqCst) {
            let failed = self.inner.dispatcher.pending().fail_all();
            debug!(failed, "Loopback channel closed");
        }
    }
}

impl LoopbackInner {
    async fn serve(&self, frame: Vec<u8>) {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let response = match self.exporter.handle(&frame).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Dropping unreadable request: {}", e);
                return;
            }
        };

        if self.drop_responses.load(Ordering::Relaxed) {
            debug!("Response dropped");
            return;
        }
        if !self.open.load(Ordering::SeqCst) {
            debug!("Channel closed before response");
            return;
        }

        match self.dispatcher.dispatch(&response) {
            Ok(Dispatch::Delivered) | Ok(Dispatch::Stale) => {}
            Err(e) => warn!("Undeliverable response: {}", e),
        }
    }
}

#[async_trait]
impl RpcChannel for LoopbackChannel {
    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: Vec<u8>) -> RpcResult<()> {
        if !self.is_open() {
            return Err(RpcError::ChannelClosed);
        }
        self.inner.sent.fetch_add(1, Ordering::Relaxed);

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.serve(frame).await });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::MethodTable;
    use crate::pending::PendingCallTable;
    use crate::protocol::{CorrelationId, RpcRequest};
    use drpc_core::RemoteFault;
    use serde_json::json;

    fn channel() -> (LoopbackChannel, Arc<PendingCallTable>) {
        let exporter = Arc::new(ServiceExporter::new());
        exporter.export(
            "Echo",
            MethodTable::new().method("echo", |(s,): (String,)| async move { Ok::<_, RemoteFault>(s) }),
        );
        let pending = Arc::new(PendingCallTable::unbounded());
        let dispatcher = Arc::new(ResponseDispatcher::new(pending.clone()));
        (LoopbackChannel::new(exporter, dispatcher), pending)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (channel, pending) = channel();
        let id = CorrelationId::new();
        let receiver = pending.register(id, "Echo", "echo").unwrap();

        let request = RpcRequest::new(id, "Echo", "echo", json!(["ping"]));
        channel.send(request.to_frame().unwrap()).await.unwrap();

        assert_eq!(receiver.await.unwrap(), Ok(json!("ping")));
        assert_eq!(channel.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_rejects_send() {
        let (channel, _pending) = channel();
        channel.close();
        assert!(!channel.is_open());
        assert_eq!(channel.send(b"{}".to_vec()).await, Err(RpcError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls() {
        let (channel, pending) = channel();
        channel.set_drop_responses(true);
        let id = CorrelationId::new();
        let receiver = pending.register(id, "Echo", "echo").unwrap();

        let request = RpcRequest::new(id, "Echo", "echo", json!(["ping"]));
        channel.send(request.to_frame().unwrap()).await.unwrap();
        channel.close();

        assert!(receiver.await.is_err());
        assert!(pending.is_empty());
    }
}
