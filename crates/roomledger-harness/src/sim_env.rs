//! Simulated environment with a manual clock and a seeded RNG.
//!
//! Time only moves when a test calls [`SimEnv::advance`] or when driver code
//! sleeps; a sleep advances the clock by the requested duration (rounded up to
//! whole seconds) and returns immediately. Two `SimEnv`s built from the same
//! seed produce the same random stream.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roomledger_core::{Environment, Timestamp};

/// Start of simulated time (2023-11-14T22:13:20Z).
pub const SIM_EPOCH: Timestamp = 1_700_000_000;

/// Deterministic [`Environment`] for tests. Clones share clock and RNG.
#[derive(Clone, Debug)]
pub struct SimEnv {
    clock: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment at [`SIM_EPOCH`] with RNG seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment at [`SIM_EPOCH`] with the given RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(AtomicU64::new(SIM_EPOCH)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, secs: u64) {
        let _ = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(secs)));
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Timestamp {
        self.clock.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
        self.advance(secs);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
