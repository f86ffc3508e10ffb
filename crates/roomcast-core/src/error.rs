//! Registry error types.
//!
//! Structural errors ([`RegistryError`]) are returned to the immediate caller
//! and never leave the registry in an unusable state. Delivery failures are
//! collected per connection during a broadcast pass and reported together in a
//! [`DeliveryReport`] once the pass completes.

use crate::handle::ConnectionId;

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Handle or id does not refer to a live connection.
    ///
    /// Either never registered here or already removed. Room operations on
    /// such a handle change nothing.
    #[error("unknown connection: {0}")]
    UnknownHandle(ConnectionId),

    /// Room has no entry.
    ///
    /// Rooms exist only while they have members, so this covers both rooms
    /// that emptied out and misspelled names.
    #[error("room not found: {0}")]
    UnknownRoom(String),

    /// Supplied id belongs to a live connection.
    #[error("connection id already registered: {0}")]
    DuplicateId(ConnectionId),

    /// Registry already holds the configured maximum of connections.
    #[error("connection limit reached ({limit})")]
    CapacityExceeded {
        /// Configured maximum
        limit: usize,
    },

    /// Connection is already in the configured maximum of rooms.
    #[error("connection {id} is already in {limit} rooms")]
    RoomLimitExceeded {
        /// Connection that tried to join
        id: ConnectionId,
        /// Configured maximum
        limit: usize,
    },

    /// Single-target delivery failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryFailure),
}

/// Transport-level send failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Remote end is gone; the transport no longer accepts payloads.
    #[error("connection closed")]
    Closed,

    /// Transport buffer is full.
    #[error("outbound buffer full")]
    Full,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// One failed send during a delivery pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery to {id} failed: {error}")]
pub struct DeliveryFailure {
    /// Connection that could not be reached
    pub id: ConnectionId,
    /// Why the transport refused the payload
    #[source]
    pub error: SendError,
}

/// Outcome of a broadcast or emit pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of connections the payload was handed to
    pub delivered: usize,
    /// Connections whose transport refused the payload
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    /// True if every targeted connection accepted the payload.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of connections targeted by the pass.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}
