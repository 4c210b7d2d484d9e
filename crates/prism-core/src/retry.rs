//! Exponential backoff with jitter, used both for transport reconnection (§4.2:
//! base 1s, cap 30s) and process-manager restart scheduling (§4.6: base 1s, cap 5s).
//!
//! The doubling/clamp/jitter shape follows the teacher's
//! `governance::retry::adaptive::compute`, simplified: that function additionally
//! weighs live backlog and RTT signals we have no equivalent of here, so this is a
//! plain attempt-indexed exponential curve rather than a congestion-adaptive one.

use std::time::Duration;

use rand::Rng;

/// A backoff schedule: `base * 2^attempt`, clamped to `max`, with up to ±`jitter_ratio`
/// multiplicative jitter so that a fleet of simultaneously-failing processes doesn't
/// retry in lockstep.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter_ratio: f64,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter_ratio: 0.2,
        }
    }

    /// Transport reconnection policy (§4.2): base 1s, cap 30s.
    pub const fn transport_reconnect() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    /// Process-manager restart policy (§4.6): base 1s, cap 5s.
    pub const fn process_restart() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5))
    }

    /// The delay before retry number `attempt` (0-indexed: the delay before the
    /// *first* retry is `delay_for(0)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30);
        let unjittered = self
            .base
            .checked_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
            .unwrap_or(self.max)
            .min(self.max);

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-self.jitter_ratio..=self.jitter_ratio);
        let scaled = unjittered.as_secs_f64() * (1.0 + jitter);
        Duration::from_secs_f64(scaled.max(0.0)).min(self.max)
    }
}

/// Tracks the attempt count for a single retrying entity (one per process record,
/// one per transport connection) and hands back the next delay.
#[derive(Debug)]
pub struct RetryState {
    policy: BackoffPolicy,
    attempt: u32,
}

impl RetryState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Call after a failure: returns the delay to wait before the next attempt and
    /// advances the internal counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Call after a success to reset the schedule back to the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt
    }
}
