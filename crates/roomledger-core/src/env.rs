//! Environment abstraction for deterministic testing.
//!
//! The ledger itself never reads a clock: every operation that needs a
//! timestamp takes `now` as an argument. The `Environment` trait is what the
//! surrounding shell uses to obtain that `now`, to sleep between notification
//! retries, and to draw connection identifiers.
//!
//! - Simulation: the harness provides a manually advanced clock and a seeded
//!   RNG, so whole scenarios replay bit-for-bit.
//! - Production: the server uses wall-clock time and OS randomness without any
//!   change to the ledger logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::Duration;

use crate::Timestamp;

/// Abstract environment providing time, randomness, and async sleeping.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time in whole seconds since the Unix epoch.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: Subsequent calls must return times >= previous calls.
    fn now(&self) -> Timestamp;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code (notification retries) sleeps; ledger logic never
    /// does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Production implementations use OS entropy; simulation implementations
    /// use a seeded RNG and log the seed for reproducibility.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for connection identifiers in log fields.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
