//! Bounded retry combinators
//!
//! Two small building blocks replace ad-hoc loops:
//!
//! - [`retry`] runs an operation up to `max_attempts` times, handing each
//!   attempt the wait it should use. The combinator never sleeps itself; the
//!   operation owns the delay provider and decides where the wait goes
//!   (the actuator uses it as relay settle time).
//! - [`with_fallback`] runs a primary call and, when its error asks for it,
//!   exactly one alternative. Used for insert-or-update against the backend.
//!
//! Both are bounded by construction: there is no way to ask for an
//! unbounded loop.

use crate::constants::{RELAY_MAX_ATTEMPTS, RELAY_MAX_SETTLE_MS, RELAY_SETTLE_MS};

/// Attempt bound and growing wait schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first, at least one
    pub max_attempts: u8,
    /// Wait handed to the first attempt (ms)
    pub initial_delay_ms: u32,
    /// Growth factor applied per attempt
    pub multiplier: u32,
    /// Ceiling on the wait (ms)
    pub max_delay_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RELAY_MAX_ATTEMPTS,
            initial_delay_ms: RELAY_SETTLE_MS,
            multiplier: 2,
            max_delay_ms: RELAY_MAX_SETTLE_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` and doubling waits from `initial_delay_ms`
    pub fn new(max_attempts: u8, initial_delay_ms: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            ..Self::default()
        }
    }

    /// Set the growth factor
    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the wait ceiling
    pub fn max_delay_ms(mut self, max_delay_ms: u32) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Wait for zero-based `attempt`
    pub fn delay_for(&self, attempt: u8) -> u32 {
        let mut delay = self.initial_delay_ms;
        for _ in 0..attempt {
            delay = delay.saturating_mul(self.multiplier);
            if delay >= self.max_delay_ms {
                break;
            }
        }
        delay.min(self.max_delay_ms.max(self.initial_delay_ms))
    }

    fn attempts(&self) -> u8 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds, `should_retry` rejects its error, or the
/// policy runs out of attempts
///
/// `op` receives the zero-based attempt number and the wait for it. The
/// error of the final attempt is returned.
pub fn retry<T, E, F, R>(policy: &RetryPolicy, mut op: F, should_retry: R) -> Result<T, E>
where
    F: FnMut(u8, u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        match op(attempt, policy.delay_for(attempt)) {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= attempts || !should_retry(&err) {
                    return Err(err);
                }
            }
        }
    }
}

/// Run `primary`; if it fails with an error `should_fall_back` accepts, run
/// `fallback` once and return its result
///
/// Both calls receive `ctx`, so they can share one mutable client.
pub fn with_fallback<C, T, E, P, F, S>(
    ctx: &mut C,
    primary: P,
    fallback: F,
    should_fall_back: S,
) -> Result<T, E>
where
    C: ?Sized,
    P: FnOnce(&mut C) -> Result<T, E>,
    F: FnOnce(&mut C) -> Result<T, E>,
    S: FnOnce(&E) -> bool,
{
    match primary(ctx) {
        Err(err) if should_fall_back(&err) => fallback(ctx),
        other => other,
    }
}
