//! # typebus
//!
//! An in-process publish/subscribe broadcaster keyed by Rust type.
//!
//! Producers post values of any `Clone + Send + 'static` type. Consumers
//! subscribe to a type and receive a live sequence of exactly the values
//! posted with that type. No shared enum or base trait ties the message types
//! together.
//!
//! ## Core Concepts
//!
//! - **Type keys**: values are routed by [`TypeKey`], built from `TypeId`
//! - **Subscriptions**: each one owns an unbounded queue; a slow consumer
//!   never blocks producers or other consumers
//! - **Cleanup**: dropping or cancelling a [`Subscription`] unregisters it
//! - **Instances**: [`Broadcaster::new`] gives an isolated registry;
//!   [`Broadcaster::global`] (and the free [`post`] / [`subscribe`]) share one
//!   per process
//!
//! Unbounded buffering trades memory for never blocking: a consumer that
//! falls behind a fast producer grows its queue without limit. Use
//! [`SubscriptionConfig::bounded`] to drop such consumers instead.
//!
//! ## Example
//!
//! ```
//! use typebus::Broadcaster;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Foo {
//!     bar: i64,
//! }
//!
//! let bus = Broadcaster::new();
//! let first = bus.subscribe::<Foo>();
//! let second = bus.subscribe::<Foo>();
//!
//! bus.post(Foo { bar: 42 });
//! bus.post("ignored: wrong type");
//!
//! assert_eq!(first.recv().unwrap(), Foo { bar: 42 });
//! assert_eq!(second.recv().unwrap(), Foo { bar: 42 });
//!
//! drop(first);
//! bus.post(Foo { bar: 7 });
//! assert_eq!(second.recv().unwrap(), Foo { bar: 7 });
//! assert_eq!(bus.subscriber_count::<Foo>(), 1);
//! ```

pub mod broadcaster;
pub mod error;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use broadcaster::{Broadcaster, BroadcasterConfig};
pub use error::{BroadcastError, Result};
pub use subscriptions::{Canceller, Subscription, SubscriptionConfig};
pub use types::{BroadcasterStats, SubscriptionId, SubscriptionState, TerminationReason, TypeKey};

/// Post `value` on the process-wide broadcaster.
pub fn post<T: Clone + Send + 'static>(value: T) {
    Broadcaster::global().post(value);
}

/// Subscribe to `T` on the process-wide broadcaster.
pub fn subscribe<T: Clone + Send + 'static>() -> Subscription<T> {
    Broadcaster::global().subscribe()
}
