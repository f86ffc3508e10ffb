//! Randomness for connection ids.
//!
//! Id generation goes through the [`IdSource`] trait so registries can be
//! driven by the OS CSPRNG in production and by a seeded RNG in tests.
//!
//! # Implementations
//!
//! - [`SystemIds`]: getrandom, not reproducible
//! - [`SeededIds`]: ChaCha20 seeded from a `u64`, same seed gives the same ids

#![allow(clippy::disallowed_types, reason = "Locking seeded RNG state")]

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::handle::ConnectionId;

/// Source of random bytes for connection ids.
pub trait IdSource: Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random UUIDv4-formatted connection id.
    fn connection_id(&self) -> ConnectionId {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        ConnectionId::from_uuid_bytes(bytes)
    }
}

/// Production id source backed by the OS CSPRNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Ids must be unguessable, and an OS without a
/// working entropy source cannot provide that.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIds;

impl IdSource for SystemIds {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

/// Deterministic id source for tests and simulation.
pub struct SeededIds {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededIds {
    /// Create a source that replays the same ids for the same seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }
}

impl fmt::Debug for SeededIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededIds").finish_non_exhaustive()
    }
}

impl IdSource for SeededIds {
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
