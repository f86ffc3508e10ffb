//! Registry limits.

/// Limits enforced by the [`Registry`](crate::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of live connections
    pub max_connections: usize,
    /// Maximum number of rooms a single connection may be in at once
    pub max_rooms_per_connection: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, max_rooms_per_connection: 64 }
    }
}
