//! Subscription registry and the delivery path.

use crate::types::{BroadcasterStats, Lifecycle, SubscriptionId, TerminationReason, TypeKey};
use crossbeam_channel::{bounded, unbounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use super::types::{ChannelRoute, Delivery, Route, Subscription, SubscriptionConfig};

/// Routes by type key, plus the reverse index used for removal by id.
#[derive(Default)]
struct Registry {
    routes: HashMap<TypeKey, HashMap<SubscriptionId, Arc<dyn Route>>>,
    owners: HashMap<SubscriptionId, TypeKey>,
}

/// Owns the registry for one broadcaster and fans posted values out to it.
///
/// Every registry read and write happens under a single lock. The lock is
/// never held while cloning or enqueueing a value.
pub(crate) struct SubscriptionManager {
    name: String,
    registry: Mutex<Registry>,
    posted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl SubscriptionManager {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            registry: Mutex::new(Registry::default()),
            posted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Register a new subscription for `T`.
    ///
    /// The route is installed before this returns, so any post that happens
    /// afterwards reaches it. `config` must already be validated.
    pub(crate) fn subscribe<T: Clone + Send + 'static>(
        self: &Arc<Self>,
        config: &SubscriptionConfig,
    ) -> Subscription<T> {
        let id = SubscriptionId::next();
        let key = TypeKey::of::<T>();
        let (sender, receiver) = match config.buffer_size {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let lifecycle = Arc::new(Lifecycle::new());
        let route: Arc<dyn Route> = Arc::new(ChannelRoute::new(sender, lifecycle.clone()));

        {
            let mut registry = self.registry.lock();
            registry.routes.entry(key).or_default().insert(id, route);
            registry.owners.insert(id, key);
        }

        debug!(broadcaster = %self.name, subscription = %id, type_key = %key, "subscribed");
        Subscription::new(id, key, receiver, lifecycle, Arc::downgrade(self))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    ///
    /// The route is terminated before this returns: no value is enqueued for
    /// it afterwards, even by a post already in flight.
    pub(crate) fn remove(&self, id: SubscriptionId, reason: TerminationReason) -> bool {
        let removed = {
            let mut registry = self.registry.lock();
            let Some(key) = registry.owners.remove(&id) else {
                return false;
            };
            let route = registry.routes.get_mut(&key).and_then(|subs| subs.remove(&id));
            if registry.routes.get(&key).is_some_and(|subs| subs.is_empty()) {
                registry.routes.remove(&key);
            }
            route.map(|route| (key, route))
        };
        let Some((key, route)) = removed else {
            return false;
        };

        // Outside the registry lock: dropping the sender may drop buffered values.
        route.terminate(reason);
        drop(route);

        debug!(
            broadcaster = %self.name,
            subscription = %id,
            type_key = %key,
            %reason,
            "unsubscribed"
        );
        true
    }

    /// Deliver `value` to every subscription registered for `T`.
    pub(crate) fn post<T: Clone + Send + 'static>(&self, value: T) {
        let key = TypeKey::of::<T>();
        self.posted.fetch_add(1, Ordering::Relaxed);

        let routes: Vec<(SubscriptionId, Arc<dyn Route>)> = {
            let registry = self.registry.lock();
            match registry.routes.get(&key) {
                Some(subs) => subs.iter().map(|(id, route)| (*id, route.clone())).collect(),
                None => Vec::new(),
            }
        };

        if routes.is_empty() {
            trace!(broadcaster = %self.name, type_key = %key, "post without subscribers");
            return;
        }

        let mut overflowed = Vec::new();
        for (id, route) in &routes {
            match route.deliver(&value) {
                Delivery::Delivered => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Delivery::Full => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        broadcaster = %self.name,
                        subscription = %id,
                        type_key = %key,
                        "subscriber buffer full, dropping subscriber"
                    );
                    overflowed.push(*id);
                }
                // Cancelled concurrently; removal is already under way.
                Delivery::Closed => {}
                Delivery::TypeMismatch => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        broadcaster = %self.name,
                        subscription = %id,
                        expected = route.expected().type_name(),
                        got = key.type_name(),
                        "dropping misrouted value"
                    );
                }
            }
        }
        drop(routes);

        for id in overflowed {
            self.remove(id, TerminationReason::BufferOverflow);
        }
    }

    pub(crate) fn subscriber_count(&self, key: TypeKey) -> usize {
        self.registry
            .lock()
            .routes
            .get(&key)
            .map_or(0, |subs| subs.len())
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.registry.lock().owners.len()
    }

    pub(crate) fn type_count(&self) -> usize {
        self.registry.lock().routes.len()
    }

    pub(crate) fn stats(&self) -> BroadcasterStats {
        let (type_keys, subscriptions) = {
            let registry = self.registry.lock();
            (registry.routes.len(), registry.owners.len())
        };
        BroadcasterStats {
            type_keys,
            subscriptions,
            posted: self.posted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        let count = registry.owners.len();
        for route in registry.routes.values().flat_map(|subs| subs.values()) {
            route.terminate(TerminationReason::Shutdown);
        }
        if count > 0 {
            debug!(broadcaster = %self.name, subscriptions = count, "shutting down");
        }
    }
}
