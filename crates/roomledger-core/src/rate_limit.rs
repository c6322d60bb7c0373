//! Per-caller posting cooldown.

use std::collections::HashMap;

use crate::{CallerId, LedgerError, Timestamp};

/// Default minimum spacing between two posts by the same caller.
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Tracks the last successful post of every caller.
#[derive(Debug, Default, Clone)]
pub struct RateLimiter {
    last_post: HashMap<CallerId, Timestamp>,
}

impl RateLimiter {
    /// Create a limiter with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds `caller` must still wait at `now`, or 0 if they may post.
    ///
    /// A `now` earlier than the last post counts as still cooling down.
    pub fn remaining(&self, caller: &CallerId, now: Timestamp, cooldown: u64) -> u64 {
        self.last_post
            .get(caller)
            .map_or(0, |last| last.saturating_add(cooldown).saturating_sub(now))
    }

    /// Check the cooldown without recording anything.
    ///
    /// # Errors
    ///
    /// `CooldownActive` if `now < last_post + cooldown`.
    pub fn check(
        &self,
        caller: &CallerId,
        now: Timestamp,
        cooldown: u64,
    ) -> Result<(), LedgerError> {
        match self.remaining(caller, now, cooldown) {
            0 => Ok(()),
            retry_after_secs => Err(LedgerError::CooldownActive { retry_after_secs }),
        }
    }

    /// Check the cooldown and, if it has elapsed, record `now` as the
    /// caller's last post. Exclusive access makes the pair a single step.
    ///
    /// # Errors
    ///
    /// `CooldownActive` if `now < last_post + cooldown`; nothing is recorded.
    pub fn check_and_record(
        &mut self,
        caller: &CallerId,
        now: Timestamp,
        cooldown: u64,
    ) -> Result<(), LedgerError> {
        self.check(caller, now, cooldown)?;
        self.last_post.insert(caller.clone(), now);
        Ok(())
    }

    /// Last successful post of `caller`.
    pub fn last_post(&self, caller: &CallerId) -> Option<Timestamp> {
        self.last_post.get(caller).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Timestamp = 1_700_000_000;

    #[test]
    fn first_post_always_allowed() {
        let mut limiter = RateLimiter::new();
        let caller = CallerId::from("bob");
        assert!(limiter.check_and_record(&caller, T, DEFAULT_COOLDOWN_SECS).is_ok());
        assert_eq!(limiter.last_post(&caller), Some(T));
    }

    #[test]
    fn cooldown_boundary() {
        let mut limiter = RateLimiter::new();
        let caller = CallerId::from("bob");
        limiter.check_and_record(&caller, T, 60).unwrap();

        let err = limiter.check_and_record(&caller, T + 59, 60).unwrap_err();
        assert_eq!(err, LedgerError::CooldownActive { retry_after_secs: 1 });
        // rejected attempt must not move the window
        assert_eq!(limiter.last_post(&caller), Some(T));

        assert!(limiter.check_and_record(&caller, T + 60, 60).is_ok());
        assert_eq!(limiter.last_post(&caller), Some(T + 60));
    }

    #[test]
    fn callers_are_independent() {
        let mut limiter = RateLimiter::new();
        limiter.check_and_record(&CallerId::from("a"), T, 60).unwrap();
        assert!(limiter.check_and_record(&CallerId::from("b"), T, 60).is_ok());
    }

    #[test]
    fn clock_going_backwards_still_cools_down() {
        let mut limiter = RateLimiter::new();
        let caller = CallerId::from("bob");
        limiter.check_and_record(&caller, T, 60).unwrap();

        let err = limiter.check_and_record(&caller, T - 10, 60).unwrap_err();
        assert_eq!(err.retry_after_secs(), Some(70));
    }

    #[test]
    fn zero_cooldown_never_blocks() {
        let mut limiter = RateLimiter::new();
        let caller = CallerId::from("bob");
        limiter.check_and_record(&caller, T, 0).unwrap();
        assert!(limiter.check_and_record(&caller, T, 0).is_ok());
    }
}
