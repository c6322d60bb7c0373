//! Production Environment implementation using system time and RNG.
//!
//! This module provides `SystemEnv`, the production implementation of the
//! `Environment` trait that uses the wall clock and OS randomness.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use roomledger_core::{Environment, Timestamp};

/// Production environment using the wall clock and OS randomness.
///
/// - `now()` reads `SystemTime` and truncates to whole seconds
/// - `sleep()` uses `tokio::time::sleep()`
/// - `random_bytes()` uses `getrandom`
///
/// The wall clock can step backwards (NTP adjustments). The ledger's cooldown
/// arithmetic saturates, so a backwards step only lengthens a cooldown.
#[derive(Clone, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Timestamp {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Only used for connection ids in log fields.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
