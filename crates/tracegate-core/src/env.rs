//! Environment abstraction for time.
//!
//! Decouples latency measurement from the system clock. Production code uses
//! the real monotonic clock and tokio sleep; tests substitute a manually
//! advanced clock so latency assertions are deterministic.

use std::time::Duration;

/// Abstract environment providing time and async sleep.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; test environments
    /// may use a plain `Duration` since an arbitrary epoch.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code (liveness probing, retries) sleeps. Admission logic
    /// never does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Microseconds elapsed since `since`.
    fn elapsed_us(&self, since: Self::Instant) -> f64 {
        micros(self.now() - since)
    }
}

/// Convert a duration to fractional microseconds.
pub fn micros(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e6
}
