//! The broadcaster handle and the process-wide instance.

use crate::error::Result;
use crate::subscriptions::{Subscription, SubscriptionConfig, SubscriptionManager};
use crate::types::{BroadcasterStats, SubscriptionId, TerminationReason, TypeKey};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Broadcaster configuration.
#[derive(Clone, Debug)]
pub struct BroadcasterConfig {
    /// Name used in log fields.
    pub name: String,

    /// Buffering applied by [`Broadcaster::subscribe`].
    pub subscription: SubscriptionConfig,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            subscription: SubscriptionConfig::default(),
        }
    }
}

static GLOBAL: OnceLock<Broadcaster> = OnceLock::new();

/// Type-keyed publish/subscribe hub.
///
/// Cloning yields another handle to the same registry. Independent,
/// isolated instances come from [`Broadcaster::new`] or
/// [`Broadcaster::with_config`]. When the last handle is dropped, every
/// outstanding subscription terminates with [`TerminationReason::Shutdown`].
#[derive(Clone)]
pub struct Broadcaster {
    manager: Arc<SubscriptionManager>,
    subscription: SubscriptionConfig,
}

impl Broadcaster {
    /// Create an isolated broadcaster with default configuration.
    pub fn new() -> Self {
        Self::from_config(BroadcasterConfig::default())
    }

    /// Create an isolated broadcaster.
    pub fn with_config(config: BroadcasterConfig) -> Result<Self> {
        config.subscription.validate()?;
        Ok(Self::from_config(config))
    }

    /// The process-wide shared instance.
    pub fn global() -> &'static Broadcaster {
        GLOBAL.get_or_init(|| {
            Self::from_config(BroadcasterConfig {
                name: "global".to_string(),
                ..Default::default()
            })
        })
    }

    fn from_config(config: BroadcasterConfig) -> Self {
        Self {
            manager: Arc::new(SubscriptionManager::new(config.name)),
            subscription: config.subscription,
        }
    }

    /// Name given in the configuration.
    pub fn name(&self) -> &str {
        self.manager.name()
    }

    /// Deliver `value` to every current subscriber of `T`.
    ///
    /// A no-op without subscribers. Never waits on consumers.
    pub fn post<T: Clone + Send + 'static>(&self, value: T) {
        self.manager.post(value);
    }

    /// Subscribe to values of type `T` using this broadcaster's default buffering.
    ///
    /// The subscription is registered before this returns: anything posted
    /// afterwards is delivered. Nothing posted earlier is replayed.
    pub fn subscribe<T: Clone + Send + 'static>(&self) -> Subscription<T> {
        self.manager.subscribe(&self.subscription)
    }

    /// Subscribe with explicit buffering.
    pub fn subscribe_with<T: Clone + Send + 'static>(
        &self,
        config: SubscriptionConfig,
    ) -> Result<Subscription<T>> {
        config.validate()?;
        Ok(self.manager.subscribe(&config))
    }

    /// Remove a subscription by id. Returns `true` only for the call that
    /// actually removed it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.manager.remove(id, TerminationReason::Cancelled)
    }

    /// Live subscriptions for `T`.
    pub fn subscriber_count<T: 'static>(&self) -> usize {
        self.manager.subscriber_count(TypeKey::of::<T>())
    }

    /// Whether anything is currently subscribed to `T`.
    pub fn has_subscribers<T: 'static>(&self) -> bool {
        self.subscriber_count::<T>() > 0
    }

    /// Live subscriptions across all types.
    pub fn subscription_count(&self) -> usize {
        self.manager.subscription_count()
    }

    /// Distinct types with at least one subscription.
    pub fn type_count(&self) -> usize {
        self.manager.type_count()
    }

    /// Snapshot of registry size and delivery counters.
    pub fn stats(&self) -> BroadcasterStats {
        self.manager.stats()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("name", &self.name())
            .field("stats", &self.stats())
            .finish()
    }
}
