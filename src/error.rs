//! Error types for the broadcaster.

use crate::types::{SubscriptionId, TerminationReason};
use thiserror::Error;

/// Errors surfaced by subscriptions and configuration.
///
/// `post` and `subscribe` never return these; they only show up on the
/// receiving side of a subscription and when validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("Subscription {id} terminated: {reason}")]
    Terminated {
        id: SubscriptionId,
        reason: TerminationReason,
    },

    #[error("Timed out waiting for a value")]
    Timeout,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for broadcaster operations.
pub type Result<T> = std::result::Result<T, BroadcastError>;
