//! The subscription watch loop.
//!
//! A subscription is kept alive by a one-shot child watch on the provider
//! branch. Every firing runs one cycle:
//!
//! 1. if the consumer's own node is gone, stop (this is how `unsubscribe`
//!    ends the loop; there is no other cancellation);
//! 2. read the full provider list and publish it;
//! 3. arm the watch again.
//!
//! A change landing between the read in step 2 and the re-arm in step 3 is not
//! observed until the next one. A failure in any step is logged and ends the
//! subscription in [`SubscriptionState::Failed`]; it never reaches the store's
//! notification thread.

use crate::registry::StoreRegistry;
use crate::store::{HierarchicalStore, WatchEvent};
use drpc_core::{RegistryEntry, RegistryResult, ServiceUpdateEvent};
use std::fmt;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Lifecycle of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Watch armed, events flowing.
    Active,
    /// Consumer node observed absent; no longer watching.
    Ended,
    /// A watch cycle failed; no longer watching.
    Failed { reason: String },
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Active => write!(f, "active"),
            SubscriptionState::Ended => write!(f, "ended"),
            SubscriptionState::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// State plus the generation of the loop that owns it.
///
/// Subscribing again replaces the record with a new generation; an older
/// loop that wakes up afterwards sees it was superseded and exits quietly.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionRecord {
    pub(crate) generation: u64,
    pub(crate) state: SubscriptionState,
}

/// Install a child watch whose firing completes the returned receiver.
pub(crate) async fn arm(
    store: &dyn HierarchicalStore,
    path: &str,
) -> RegistryResult<oneshot::Receiver<WatchEvent>> {
    let (tx, rx) = oneshot::channel();
    store
        .watch_children(
            path,
            Box::new(move |event| {
                // The loop may be gone already; nothing to do then.
                let _ = tx.send(event);
            }),
        )
        .await?;
    Ok(rx)
}

/// Result of one watch cycle.
enum Cycle {
    Rearmed(oneshot::Receiver<WatchEvent>),
    ConsumerGone,
}

/// One subscription's loop.
pub(crate) struct WatchLoop {
    pub(crate) registry: StoreRegistry,
    pub(crate) consumer: RegistryEntry,
    pub(crate) consumer_path: String,
    pub(crate) provider_branch: String,
    pub(crate) generation: u64,
}

impl WatchLoop {
    pub(crate) async fn run(self, mut watch: oneshot::Receiver<WatchEvent>) {
        loop {
            let event = match watch.await {
                Ok(event) => event,
                Err(_) => {
                    // The store dropped the watch without firing it.
                    self.fail("watch dropped by the store".to_string());
                    return;
                }
            };

            if !self.registry.is_current(&self.consumer_path, self.generation) {
                debug!(
                    consumer = %self.consumer_path,
                    generation = self.generation,
                    "Watch loop superseded"
                );
                return;
            }
            debug!(consumer = %self.consumer_path, event = %event, "Provider watch fired");

            match self.cycle().await {
                Ok(Cycle::Rearmed(next)) => watch = next,
                Ok(Cycle::ConsumerGone) => {
                    self.registry.set_state(
                        &self.consumer_path,
                        self.generation,
                        SubscriptionState::Ended,
                    );
                    info!(
                        service = %self.consumer.service_name,
                        consumer = %self.consumer_path,
                        "Subscription ended"
                    );
                    return;
                }
                Err(e) => {
                    self.fail(e.to_string());
                    return;
                }
            }
        }
    }

    async fn cycle(&self) -> RegistryResult<Cycle> {
        let store = self.registry.store();
        if !store.exists_node(&self.consumer_path).await? {
            return Ok(Cycle::ConsumerGone);
        }

        let providers = self.registry.query_branch(&self.provider_branch).await?;
        let event = ServiceUpdateEvent::new(self.consumer.service_name.clone(), providers);
        self.registry.publisher().publish(&event);

        let next = arm(store.as_ref(), &self.provider_branch).await?;
        Ok(Cycle::Rearmed(next))
    }

    fn fail(&self, reason: String) {
        error!(
            service = %self.consumer.service_name,
            consumer = %self.consumer_path,
            "Watch callback failed, subscription stopped: {}",
            reason
        );
        self.registry.set_state(
            &self.consumer_path,
            self.generation,
            SubscriptionState::Failed { reason },
        );
    }
}
