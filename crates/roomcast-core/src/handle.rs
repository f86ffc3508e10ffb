//! Connection handles.
//!
//! A [`ConnectionHandle`] pairs a unique [`ConnectionId`] with the outbound
//! half of a transport connection. Handles are created by
//! [`Registry::add`](crate::Registry::add) and are cheap to clone; every clone
//! refers to the same connection.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{error::SendError, outbound::Outbound};

/// Opaque identifier of a live connection.
///
/// Unique across all live handles of a registry. Generated ids are random
/// UUIDv4 strings; transports may also supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an externally assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Format 16 random bytes as a version 4 UUID.
    pub(crate) fn from_uuid_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
    }

    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

struct Inner {
    id: ConnectionId,
    outbound: Box<dyn Outbound>,
}

/// Identity plus send capability for one live connection.
///
/// Equality and hashing use the id only. Handles hold no references to rooms
/// or to the registry that created them.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: ConnectionId, outbound: Box<dyn Outbound>) -> Self {
        Self { inner: Arc::new(Inner { id, outbound }) }
    }

    /// Connection identifier.
    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    /// Push a payload to the remote peer.
    ///
    /// Transport failures are returned to the caller, never swallowed.
    pub fn send(&self, payload: &str) -> Result<(), SendError> {
        self.inner.outbound.send(payload)
    }

    /// True if both handles were produced by the same `add` call.
    ///
    /// Stricter than `==`, which only compares ids: a stale handle whose id
    /// was later reused by another connection is equal but not the same.
    pub fn same_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.inner.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn uuid_format_sets_version_and_variant() {
        let id = ConnectionId::from_uuid_bytes([0xff; 16]);
        assert_eq!(id.as_str(), "ffffffff-ffff-4fff-bfff-ffffffffffff");

        let id = ConnectionId::from_uuid_bytes([0x00; 16]);
        assert_eq!(id.as_str(), "00000000-0000-4000-8000-000000000000");

        let parsed = uuid::Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::Random));
        assert_eq!(parsed.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn equality_is_by_id() {
        let (tx1, _rx1) = mpsc::unbounded_channel::<String>();
        let (tx2, _rx2) = mpsc::unbounded_channel::<String>();

        let a = ConnectionHandle::new(ConnectionId::new("same"), Box::new(tx1));
        let b = ConnectionHandle::new(ConnectionId::new("same"), Box::new(tx2));

        assert_eq!(a, b);
        assert!(!a.same_connection(&b));
        assert!(a.same_connection(&a.clone()));
    }

    #[test]
    fn send_reaches_outbound_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = ConnectionHandle::new(ConnectionId::new("c1"), Box::new(tx));

        handle.send("hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");

        drop(rx);
        assert_eq!(handle.send("gone"), Err(SendError::Closed));
    }
}
