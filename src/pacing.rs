//! Shared pacing delay, the single actuator of the feedback loop.
//!
//! The analyzer's control step writes the delay; the generator reads it
//! fresh before each sleep. It is the only state shared across stage
//! boundaries outside of message passing, so it lives behind an atomic.

use std::sync::atomic::{AtomicU64, Ordering};

/// Smallest allowed pacing delay in seconds. A zero or negative sleep would
/// starve the other stages of scheduling fairness.
pub const MIN_DELAY_SECS: f64 = 0.01;

/// Largest allowed pacing delay in seconds. Bounds worst-case throughput
/// collapse when the controller saturates.
pub const MAX_DELAY_SECS: f64 = 5.0;

/// Atomically shared pacing delay in seconds.
///
/// Stored as raw `f64` bits in an `AtomicU64`. The analyzer is the only
/// writer and the generator the only reader, so the load-modify-store in
/// [`PacingDelay::adjust`] does not race.
#[derive(Debug)]
pub struct PacingDelay(AtomicU64);

impl PacingDelay {
    /// Creates a delay clamped into the allowed range.
    pub fn new(initial_secs: f64) -> Self {
        let clamped = initial_secs.clamp(MIN_DELAY_SECS, MAX_DELAY_SECS);
        Self(AtomicU64::new(clamped.to_bits()))
    }

    /// Returns the current delay in seconds.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }

    /// Applies a controller adjustment: `delay - adjustment`, clamped to
    /// `[MIN_DELAY_SECS, MAX_DELAY_SECS]`. Returns the updated delay.
    ///
    /// A positive adjustment speeds generation up; a negative one slows it
    /// down.
    pub fn adjust(&self, adjustment: f64) -> f64 {
        let updated = (self.get() - adjustment).clamp(MIN_DELAY_SECS, MAX_DELAY_SECS);
        self.0.store(updated.to_bits(), Ordering::SeqCst);
        updated
    }
}
