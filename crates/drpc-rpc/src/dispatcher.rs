//! Inbound response handling.

use crate::pending::PendingCallTable;
use crate::protocol::RpcResponse;
use drpc_core::RpcResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What happened to an inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the waiting caller.
    Delivered,
    /// Nobody was waiting: the call timed out, was abandoned, or the
    /// correlation id was never issued.
    Stale,
}

/// Matches inbound response frames to pending calls.
///
/// The transport calls [`ResponseDispatcher::dispatch`] from whatever task
/// reads the connection.
pub struct ResponseDispatcher {
    pending: Arc<PendingCallTable>,
    stale: AtomicU64,
}

impl ResponseDispatcher {
    pub fn new(pending: Arc<PendingCallTable>) -> Self {
        Self {
            pending,
            stale: AtomicU64::new(0),
        }
    }

    pub fn pending(&self) -> &Arc<PendingCallTable> {
        &self.pending
    }

    /// Responses discarded because nobody was waiting.
    pub fn stale_count(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    /// Fails with a protocol error on a malformed frame; a stale response
    /// is not an error.
    pub fn dispatch(&self, frame: &[u8]) -> RpcResult<Dispatch> {
        let response = RpcResponse::from_frame(frame)?;
        let id = response.correlation_id;

        if self.pending.complete(id, response.outcome.into_result()) {
            Ok(Dispatch::Delivered)
        } else {
            self.stale.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %id, "Discarding stale response");
            Ok(Dispatch::Stale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CorrelationId;
    use drpc_core::{RemoteFault, RpcError};
    use serde_json::json;

    fn frame(id: CorrelationId, outcome: Result<serde_json::Value, RemoteFault>) -> Vec<u8> {
        RpcResponse::new(id, outcome).to_frame().unwrap()
    }

    #[tokio::test]
    async fn test_delivered() {
        let pending = Arc::new(PendingCallTable::unbounded());
        let dispatcher = ResponseDispatcher::new(pending.clone());
        let id = CorrelationId::new();
        let receiver = pending.register(id, "s", "m").unwrap();

        assert_eq!(dispatcher.dispatch(&frame(id, Ok(json!(1)))).unwrap(), Dispatch::Delivered);
        assert_eq!(receiver.await.unwrap(), Ok(json!(1)));
        assert_eq!(dispatcher.stale_count(), 0);
    }

    #[test]
    fn test_unknown_id_is_stale() {
        let dispatcher = ResponseDispatcher::new(Arc::new(PendingCallTable::unbounded()));

        let result = dispatcher.dispatch(&frame(CorrelationId::new(), Ok(json!(1))));
        assert_eq!(result.unwrap(), Dispatch::Stale);
        assert_eq!(dispatcher.stale_count(), 1);
    }

    #[test]
    fn test_duplicate_response_is_stale() {
        let pending = Arc::new(PendingCallTable::unbounded());
        let dispatcher = ResponseDispatcher::new(pending.clone());
        let id = CorrelationId::new();
        let _receiver = pending.register(id, "s", "m").unwrap();

        let response = frame(id, Ok(json!("once")));
        assert_eq!(dispatcher.dispatch(&response).unwrap(), Dispatch::Delivered);
        assert_eq!(dispatcher.dispatch(&response).unwrap(), Dispatch::Stale);
    }

    #[test]
    fn test_malformed_frame() {
        let pending = Arc::new(PendingCallTable::unbounded());
        let dispatcher = ResponseDispatcher::new(pending.clone());
        let _receiver = pending.register(CorrelationId::new(), "s", "m").unwrap();

        let result = dispatcher.dispatch(b"{\"correlation_id\": 7}");
        assert!(matches!(result, Err(RpcError::Protocol(_))));
        // A bad frame never touches pending calls.
        assert_eq!(pending.len(), 1);
        assert_eq!(dispatcher.stale_count(), 0);
    }
}
