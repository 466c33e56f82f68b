//! Type-keyed subscriptions.
//!
//! Each subscription is a channel plus a type-erased route filed under the
//! [`TypeKey`](crate::TypeKey) of its value type. Posting looks up the routes
//! for the posted value's key and enqueues a clone onto each.
//!
//! Subscriptions support:
//! - Blocking, timed and non-blocking receive, and iteration
//! - Cancellation from the owning thread, from another thread via
//!   [`Canceller`], or by dropping the handle
//! - Unbounded buffers by default; bounded buffers drop a slow subscriber
//!
//! # Example
//!
//! ```
//! use typebus::{Broadcaster, SubscriptionConfig};
//!
//! let bus = Broadcaster::new();
//! let sub = bus.subscribe_with::<u32>(SubscriptionConfig::bounded(16)).unwrap();
//!
//! bus.post(7u32);
//! assert_eq!(sub.recv().unwrap(), 7);
//! ```

mod manager;
mod types;

pub(crate) use manager::SubscriptionManager;
pub use types::{Canceller, Subscription, SubscriptionConfig};
