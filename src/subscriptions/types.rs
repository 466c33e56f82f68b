//! Subscription handles and the type-erased delivery routes behind them.

use crate::error::{BroadcastError, Result};
use crate::types::{Lifecycle, SubscriptionId, SubscriptionState, TerminationReason, TypeKey};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::manager::SubscriptionManager;

/// Configuration for a subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Max buffered values before the subscriber is dropped.
    /// Default: `None` (unbounded, never drops).
    pub buffer_size: Option<usize>,
}

impl SubscriptionConfig {
    /// Unbounded buffering.
    pub fn unbounded() -> Self {
        Self { buffer_size: None }
    }

    /// Bounded buffering; a full buffer on delivery drops the subscriber.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            buffer_size: Some(capacity),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.buffer_size == Some(0) {
            return Err(BroadcastError::InvalidConfig(
                "buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of handing one value to one route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Bounded buffer is full.
    Full,
    /// Route already terminated or receiver gone.
    Closed,
    /// Value is not of the route's type. Unreachable unless the registry is corrupt.
    TypeMismatch,
}

/// Type-erased sending half of a subscription.
pub(crate) trait Route: Send + Sync {
    /// The type this route was installed for.
    fn expected(&self) -> TypeKey;

    fn deliver(&self, value: &dyn Any) -> Delivery;

    fn terminate(&self, reason: TerminationReason) -> bool;
}

/// Channel-backed route. The sender is taken on termination, so once
/// `terminate` returns no further value can be enqueued.
pub(crate) struct ChannelRoute<T> {
    sender: Mutex<Option<Sender<T>>>,
    lifecycle: Arc<Lifecycle>,
}

impl<T> ChannelRoute<T> {
    pub(crate) fn new(sender: Sender<T>, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
            lifecycle,
        }
    }
}

impl<T: Clone + Send + 'static> Route for ChannelRoute<T> {
    fn expected(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn deliver(&self, value: &dyn Any) -> Delivery {
        if !self.lifecycle.is_active() {
            return Delivery::Closed;
        }
        let Some(value) = value.downcast_ref::<T>() else {
            return Delivery::TypeMismatch;
        };
        let value = value.clone();

        // Rejected values come back in the error and drop after the guard.
        let result = {
            let sender = self.sender.lock();
            match sender.as_ref() {
                Some(sender) => sender.try_send(value),
                None => return Delivery::Closed,
            }
        };
        match result {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Disconnected(_)) => Delivery::Closed,
        }
    }

    fn terminate(&self, reason: TerminationReason) -> bool {
        let first = self.lifecycle.terminate(reason);
        let sender = self.sender.lock().take();
        drop(sender);
        first
    }
}

/// Handle that cancels a subscription from anywhere.
///
/// Cancelling wakes a consumer blocked in [`Subscription::recv`] or in
/// iteration once its buffered values are drained.
#[derive(Clone)]
pub struct Canceller {
    id: SubscriptionId,
    lifecycle: Arc<Lifecycle>,
    manager: Weak<SubscriptionManager>,
}

impl Canceller {
    /// Remove the subscription from its broadcaster. Idempotent.
    pub fn cancel(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.remove(self.id, TerminationReason::Cancelled);
        }
    }

    /// Id of the subscription this handle cancels.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the subscription is still receiving new values.
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

/// A live sequence of values of type `T` posted to a broadcaster.
///
/// Iterating blocks until the next value arrives and ends once the
/// subscription is terminated and its buffer drained. Dropping the
/// subscription unregisters it.
pub struct Subscription<T> {
    key: TypeKey,
    receiver: Receiver<T>,
    handle: Canceller,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: SubscriptionId,
        key: TypeKey,
        receiver: Receiver<T>,
        lifecycle: Arc<Lifecycle>,
        manager: Weak<SubscriptionManager>,
    ) -> Self {
        Self {
            key,
            receiver,
            handle: Canceller {
                id,
                lifecycle,
                manager,
            },
        }
    }

    /// Unique id of this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.handle.id
    }

    /// Key of the value type this subscription receives.
    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.handle.lifecycle.state()
    }

    /// Whether new values are still being delivered.
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// Receive the next value (blocking).
    pub fn recv(&self) -> Result<T> {
        self.receiver.recv().map_err(|_| self.terminated())
    }

    /// Receive a buffered value without blocking. `Ok(None)` means nothing is
    /// buffered yet.
    pub fn try_recv(&self) -> Result<Option<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.terminated()),
        }
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => BroadcastError::Timeout,
            RecvTimeoutError::Disconnected => self.terminated(),
        })
    }

    /// Iterate over currently buffered values without blocking.
    pub fn try_iter(&self) -> impl Iterator<Item = T> + '_ {
        self.receiver.try_iter()
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Stop receiving new values. Already-buffered values can still be drained.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// A detached handle that can cancel this subscription from another thread.
    pub fn canceller(&self) -> Canceller {
        self.handle.clone()
    }

    fn terminated(&self) -> BroadcastError {
        let reason = match self.state() {
            SubscriptionState::Terminated(reason) => reason,
            // Senders only go away after the route is terminated.
            SubscriptionState::Active => TerminationReason::Shutdown,
        };
        BroadcastError::Terminated {
            id: self.id(),
            reason,
        }
    }
}

impl<T> Iterator for Subscription<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

impl<T> FusedIterator for Subscription<T> {}

impl<'a, T> IntoIterator for &'a Subscription<T> {
    type Item = T;
    type IntoIter = crossbeam_channel::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.receiver.iter()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.handle.id)
            .field("type_key", &self.key)
            .field("state", &self.state())
            .field("buffered", &self.receiver.len())
            .finish()
    }
}
