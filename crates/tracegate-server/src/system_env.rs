//! Production environment: monotonic system clock and tokio sleep.

use std::time::Duration;

use tracegate_core::Environment;

/// Production environment.
///
/// Uses `std::time::Instant::now()` for time and `tokio::time::sleep()` for
/// async sleeping. Latencies reported by the services are measured with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_env_sleep_advances_clock() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;

        assert!(env.now() - start >= Duration::from_millis(20));
        assert!(env.elapsed_us(start) >= 20_000.0);
    }
}
