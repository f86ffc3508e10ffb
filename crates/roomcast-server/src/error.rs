//! Server error types.

use roomcast_core::RegistryError;

/// Errors that can occur in the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// Fatal: prevents server startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, socket I/O error, etc.).
    ///
    /// Fatal for the affected connection; the server keeps serving others.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Registry refused an operation (connection limit reached, etc.).
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}
