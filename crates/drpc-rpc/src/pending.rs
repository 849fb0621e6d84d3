//! Correlation of in-flight calls with their responses.

use crate::protocol::CorrelationId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use drpc_core::{RemoteFault, RpcError, RpcResult};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a completed call resolves to.
pub type CallOutcome = Result<Value, RemoteFault>;

struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    created_at: Instant,
    service: String,
    method: String,
}

/// Map from correlation id to the suspended caller waiting on it.
///
/// Every path that ends a call (response, timeout, caller gone, connection
/// loss) goes through a `remove` on the map, so exactly one of them wins and
/// a slot is completed at most once.
pub struct PendingCallTable {
    calls: DashMap<CorrelationId, PendingCall>,
    max_pending: usize,
}

impl PendingCallTable {
    /// `max_pending` of 0 means unlimited.
    pub fn new(max_pending: usize) -> Self {
        Self {
            calls: DashMap::new(),
            max_pending,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Create the empty slot for a call about to be sent.
    pub fn register(
        &self,
        id: CorrelationId,
        service: &str,
        method: &str,
    ) -> RpcResult<oneshot::Receiver<CallOutcome>> {
        // Soft bound: concurrent registrations may overshoot by a few.
        if self.max_pending > 0 && self.calls.len() >= self.max_pending {
            warn!(
                pending = self.calls.len(),
                max = self.max_pending,
                "Pending call limit reached"
            );
            return Err(RpcError::Transport(format!(
                "too many pending calls (max {})",
                self.max_pending
            )));
        }

        match self.calls.entry(id) {
            Entry::Occupied(_) => Err(RpcError::DuplicateCorrelationId(id.to_string())),
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                slot.insert(PendingCall {
                    sender,
                    created_at: Instant::now(),
                    service: service.to_string(),
                    method: method.to_string(),
                });
                Ok(receiver)
            }
        }
    }

    /// Fulfil a call. Returns false if nobody was waiting for `id` anymore.
    pub fn complete(&self, id: CorrelationId, outcome: CallOutcome) -> bool {
        match self.calls.remove(&id) {
            Some((_, call)) => {
                debug!(
                    correlation_id = %id,
                    service = %call.service,
                    method = %call.method,
                    elapsed_ms = call.created_at.elapsed().as_millis() as u64,
                    "Completing call"
                );
                call.sender.send(outcome).is_ok()
            }
            None => false,
        }
    }

    /// Drop a slot without completing it.
    pub fn remove(&self, id: CorrelationId) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Drop every slot; waiting callers see the channel as closed.
    pub fn fail_all(&self) -> usize {
        let ids: Vec<CorrelationId> = self.calls.iter().map(|call| *call.key()).collect();
        let failed = ids.into_iter().filter(|id| self.remove(*id)).count();
        if failed > 0 {
            warn!(failed, "Failed all pending calls");
        }
        failed
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.calls.contains_key(&id)
    }

    /// Age of the oldest pending call.
    pub fn oldest_age(&self) -> Option<Duration> {
        self.calls
            .iter()
            .map(|call| call.created_at.elapsed())
            .max()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl Default for PendingCallTable {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_complete_delivers_once() {
        let table = PendingCallTable::unbounded();
        let id = CorrelationId::new();
        let receiver = table.register(id, "Greeter", "greet").unwrap();

        assert!(table.complete(id, Ok(json!("hello"))));
        assert!(!table.complete(id, Ok(json!("again"))));
        assert_eq!(receiver.await.unwrap(), Ok(json!("hello")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let table = PendingCallTable::unbounded();
        let id = CorrelationId::new();
        let _receiver = table.register(id, "s", "m").unwrap();

        let result = table.register(id, "s", "m");
        assert!(matches!(result, Err(RpcError::DuplicateCorrelationId(_))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_limit() {
        let table = PendingCallTable::new(2);
        let _a = table.register(CorrelationId::new(), "s", "m").unwrap();
        let _b = table.register(CorrelationId::new(), "s", "m").unwrap();

        let result = table.register(CorrelationId::new(), "s", "m");
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }

    #[tokio::test]
    async fn test_remove_then_complete_is_stale() {
        let table = PendingCallTable::unbounded();
        let id = CorrelationId::new();
        let receiver = table.register(id, "s", "m").unwrap();

        assert!(table.remove(id));
        assert!(!table.complete(id, Ok(Value::Null)));
        assert!(receiver.await.is_err());
    }

    #[tokio::test]
    async fn test_complete_after_caller_gone() {
        let table = PendingCallTable::unbounded();
        let id = CorrelationId::new();
        drop(table.register(id, "s", "m").unwrap());

        assert!(!table.complete(id, Ok(Value::Null)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = PendingCallTable::unbounded();
        let receivers: Vec<_> = (0..3)
            .map(|_| table.register(CorrelationId::new(), "s", "m").unwrap())
            .collect();

        assert_eq!(table.fail_all(), 3);
        assert!(table.is_empty());
        for receiver in receivers {
            assert!(receiver.await.is_err());
        }
    }

    #[tokio::test]
    async fn test_racing_completions_deliver_exactly_once() {
        let table = Arc::new(PendingCallTable::unbounded());

        for _ in 0..100 {
            let id = CorrelationId::new();
            let receiver = table.register(id, "s", "m").unwrap();

            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let table = table.clone();
                    tokio::spawn(async move {
                        if i == 0 {
                            table.remove(id)
                        } else {
                            table.complete(id, Ok(json!(i)))
                        }
                    })
                })
                .collect();

            let mut winners = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);

            // Either a value arrived or the slot was dropped, never both.
            let _ = receiver.await;
            assert!(table.is_empty());
        }
    }

    #[test]
    fn test_slot_stays_pending_until_completed() {
        let table = PendingCallTable::unbounded();
        let id = CorrelationId::new();
        let mut slot = tokio_test::task::spawn(table.register(id, "s", "m").unwrap());

        tokio_test::assert_pending!(slot.poll());
        assert!(table.complete(id, Ok(json!(7))));
        assert!(slot.is_woken());
        assert_eq!(tokio_test::assert_ready!(slot.poll()).unwrap(), Ok(json!(7)));
    }
}
