//! Roomcast connection and room registry.
//!
//! Tracks every live bidirectional connection, groups connections into named
//! rooms, and fans string payloads out to everyone, to a room, or to a room
//! minus its sender.
//!
//! # Architecture
//!
//! This crate owns bookkeeping only. It does not accept connections, frame
//! messages or perform I/O: transports hand the registry an [`Outbound`] for
//! each accepted connection and call [`Registry::remove`] when it closes.
//!
//! # Components
//!
//! - [`Registry`]: live connections, room membership, broadcast and emit
//! - [`ConnectionHandle`]: id plus send capability for one connection
//! - [`Outbound`]: send capability implemented by transports
//! - [`IdSource`]: randomness for generated connection ids

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handle;
mod ids;
mod outbound;
mod registry;

pub use config::RegistryConfig;
pub use error::{DeliveryFailure, DeliveryReport, RegistryError, SendError};
pub use handle::{ConnectionHandle, ConnectionId};
pub use ids::{IdSource, SeededIds, SystemIds};
pub use outbound::Outbound;
pub use registry::Registry;
