//! Service-update events and their publisher.
//!
//! The registry publishes a [`ServiceUpdateEvent`] every time it observes a
//! change in a service's provider list. Listeners (routing tables, load
//! balancers, monitoring) attach to an [`EventPublisher`] that is created
//! once at process start and handed to whoever needs it.

use crate::entry::RegistryEntry;
use crate::error::ListenerError;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The full, current provider list of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUpdateEvent {
    /// Service whose providers changed.
    pub service_name: String,
    /// Every provider currently registered, not a delta.
    pub providers: Vec<RegistryEntry>,
}

impl ServiceUpdateEvent {
    pub fn new(service_name: impl Into<String>, providers: Vec<RegistryEntry>) -> Self {
        Self {
            service_name: service_name.into(),
            providers,
        }
    }
}

/// Receiver of service-update events.
///
/// Called synchronously on the publishing thread, which for registry events
/// is the watch loop of a subscription. Keep it short.
pub trait ServiceUpdateListener: Send + Sync {
    fn on_service_update(&self, event: &ServiceUpdateEvent) -> Result<(), ListenerError>;
}

impl<F> ServiceUpdateListener for F
where
    F: Fn(&ServiceUpdateEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_service_update(&self, event: &ServiceUpdateEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Handle returned by [`EventPublisher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fan-out of service-update events to local listeners.
///
/// Delivery is synchronous and in registration order. A listener that fails
/// or panics is logged and skipped; later listeners still get the event.
/// Nothing is retained, so a listener attached after a publish never sees it.
pub struct EventPublisher {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ServiceUpdateListener>)>>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Attach a listener. Safe to call from any thread.
    pub fn subscribe(&self, listener: Arc<dyn ServiceUpdateListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Detach a listener. Returns false if it was not attached.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of events published so far.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Deliver an event to every attached listener.
    ///
    /// Returns how many listeners accepted it.
    pub fn publish(&self, event: &ServiceUpdateEvent) -> usize {
        // Snapshot so listeners may attach or detach while being called.
        let listeners: Vec<_> = self.listeners.read().clone();
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_service_update(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(
                    service = %event.service_name,
                    listener = id.0,
                    "Service update listener failed: {}",
                    e
                ),
                Err(_) => error!(
                    service = %event.service_name,
                    listener = id.0,
                    "Service update listener panicked"
                ),
            }
        }

        debug!(
            service = %event.service_name,
            providers = event.providers.len(),
            delivered,
            "Published service update"
        );
        delivered
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn event(service: &str, count: u16) -> ServiceUpdateEvent {
        let providers = (0..count)
            .map(|i| RegistryEntry::new("app", service, "10.0.0.1", 9000 + i))
            .collect();
        ServiceUpdateEvent::new(service, providers)
    }

    fn recorder(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn ServiceUpdateListener> {
        Arc::new(move |e: &ServiceUpdateEvent| -> Result<(), ListenerError> {
            log.lock().push(format!("{}:{}", name, e.service_name));
            Ok(())
        })
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let publisher = EventPublisher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        publisher.subscribe(recorder(log.clone(), "first"));
        publisher.subscribe(recorder(log.clone(), "second"));

        assert_eq!(publisher.publish(&event("svc", 2)), 2);
        assert_eq!(*log.lock(), vec!["first:svc", "second:svc"]);
        assert_eq!(publisher.published_count(), 1);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let publisher = EventPublisher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        publisher.subscribe(Arc::new(|_: &ServiceUpdateEvent| -> Result<(), ListenerError> {
            Err(ListenerError("boom".into()))
        }));
        publisher.subscribe(Arc::new(|_: &ServiceUpdateEvent| -> Result<(), ListenerError> {
            panic!("listener bug")
        }));
        publisher.subscribe(recorder(log.clone(), "last"));

        assert_eq!(publisher.publish(&event("svc", 1)), 1);
        assert_eq!(*log.lock(), vec!["last:svc"]);
    }

    #[test]
    fn test_unsubscribe() {
        let publisher = EventPublisher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = publisher.subscribe(recorder(log.clone(), "gone"));
        assert_eq!(publisher.listener_count(), 1);
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));

        assert_eq!(publisher.publish(&event("svc", 1)), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_no_replay_for_late_listeners() {
        let publisher = EventPublisher::new();
        publisher.publish(&event("svc", 1));

        let log = Arc::new(Mutex::new(Vec::new()));
        publisher.subscribe(recorder(log.clone(), "late"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_listener_can_detach_during_publish() {
        let publisher = Arc::new(EventPublisher::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let inner_publisher = publisher.clone();
        let inner_slot = slot.clone();
        let id = publisher.subscribe(Arc::new(move |_: &ServiceUpdateEvent| -> Result<(), ListenerError> {
            if let Some(id) = *inner_slot.lock() {
                inner_publisher.unsubscribe(id);
            }
            Ok(())
        }));
        *slot.lock() = Some(id);

        assert_eq!(publisher.publish(&event("svc", 1)), 1);
        assert_eq!(publisher.listener_count(), 0);
    }
}
