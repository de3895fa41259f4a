//! # Topic Subscriptions
//!
//! A named topic owned by one module that fans updates out to its
//! subscribers. Each update becomes one CBT per subscriber whose action is the
//! topic name.

use crate::cbt::{Cbt, ModuleName};
use crate::payload::CbtPayload;
use crate::registry::CbtRegistry;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// A publish/subscribe topic.
///
/// Subscribers are delivered in the order they were added. Adding the same
/// module twice yields two deliveries per update.
pub struct CfxSubscription {
    owner: ModuleName,
    name: String,
    subscribers: RwLock<Vec<ModuleName>>,
    registry: Arc<CbtRegistry>,
}

impl CfxSubscription {
    #[must_use]
    pub fn new(
        owner: impl Into<ModuleName>,
        name: impl Into<String>,
        registry: Arc<CbtRegistry>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            subscribers: RwLock::new(Vec::new()),
            registry,
        }
    }

    /// Topic name, used as the action tag of every delivered CBT.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn owner(&self) -> &ModuleName {
        &self.owner
    }

    pub fn add_subscriber(&self, sink: impl Into<ModuleName>) {
        let sink = sink.into();
        debug!(topic = %self.name, subscriber = %sink, "Subscriber added");
        self.subscribers.write().push(sink);
    }

    /// Remove every subscription held by `sink`. Returns how many were removed.
    pub fn remove_subscriber(&self, sink: &ModuleName) -> usize {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s != sink);
        let removed = before - subscribers.len();
        debug!(topic = %self.name, subscriber = %sink, removed, "Subscriber removed");
        removed
    }

    #[must_use]
    pub fn subscribers(&self) -> Vec<ModuleName> {
        self.subscribers.read().clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `message` to every current subscriber.
    ///
    /// A failed delivery is logged and does not stop the rest of the
    /// fan-out. Returns the number of successful deliveries.
    pub fn post_update(&self, message: CbtPayload) -> usize {
        // Snapshot so a subscriber list change mid-fan-out cannot deadlock.
        let subscribers = self.subscribers();
        let mut delivered = 0;

        for sink in subscribers {
            let cbt = Cbt::new(&self.owner, sink, message.clone()).with_action(&self.name);
            match self.registry.submit(cbt) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(topic = %self.name, error = %e, "Subscriber delivery failed"),
            }
        }

        delivered
    }
}
