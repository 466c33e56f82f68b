//! Core types for the broadcaster.

use serde::Serialize;
use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Routing key derived from a value's declared type.
///
/// Two keys are equal iff they were built from the same Rust type. The type
/// name is carried along for logs and errors only; it takes no part in
/// equality or hashing.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for the type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name (not guaranteed unique or stable across builds).
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Source of subscription ids, shared by every broadcaster in the process.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a subscription.
///
/// Ids are process-wide and never reused, so an id from one broadcaster can
/// never name a subscription on another.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a subscription stopped receiving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Consumer cancelled or dropped the subscription.
    Cancelled,
    /// Bounded buffer was full (slow consumer).
    BufferOverflow,
    /// The broadcaster itself went away.
    Shutdown,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::BufferOverflow => "buffer overflow",
            TerminationReason::Shutdown => "broadcaster shut down",
        })
    }
}

/// Observable state of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Active,
    Terminated(TerminationReason),
}

const ACTIVE: u8 = 0;
const CANCELLED: u8 = 1;
const OVERFLOWED: u8 = 2;
const SHUT_DOWN: u8 = 3;

/// One-way `Active -> Terminated` flag shared by a subscription and its route.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Lifecycle(AtomicU8::new(ACTIVE))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire) == ACTIVE
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        match self.0.load(Ordering::Acquire) {
            ACTIVE => SubscriptionState::Active,
            CANCELLED => SubscriptionState::Terminated(TerminationReason::Cancelled),
            OVERFLOWED => SubscriptionState::Terminated(TerminationReason::BufferOverflow),
            _ => SubscriptionState::Terminated(TerminationReason::Shutdown),
        }
    }

    /// Move to `Terminated(reason)`. Returns `false` if already terminated;
    /// the first reason wins.
    pub(crate) fn terminate(&self, reason: TerminationReason) -> bool {
        let code = match reason {
            TerminationReason::Cancelled => CANCELLED,
            TerminationReason::BufferOverflow => OVERFLOWED,
            TerminationReason::Shutdown => SHUT_DOWN,
        };
        self.0
            .compare_exchange(ACTIVE, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Point-in-time counters for a broadcaster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcasterStats {
    /// Distinct type keys with at least one subscription.
    pub type_keys: usize,
    /// Live subscriptions across all type keys.
    pub subscriptions: usize,
    /// Calls to `post`, including those with no subscribers.
    pub posted: u64,
    /// Values enqueued onto subscriber channels.
    pub delivered: u64,
    /// Deliveries abandoned (overflow or misrouted value).
    pub dropped: u64,
}
