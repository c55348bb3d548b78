use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Minimum delay enforced between any two requests to the same host.
/// Prevents a misconfigured delay from turning the scanner into a DoS tool.
pub const HARD_FLOOR: Duration = Duration::from_secs(2);

/// Enforces a minimum inter-request delay per host. Each host carries its
/// own lock so pacing one target never blocks another.
pub struct Throttle {
    delay: Duration,
    hosts: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl Throttle {
    /// Creates a throttle with the given delay, clamped to [`HARD_FLOOR`].
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.max(HARD_FLOOR),
            hosts: DashMap::new(),
        }
    }

    /// Pacing disabled. For tests and embedders scanning local fixtures;
    /// the orchestrator always uses the floored constructor.
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            hosts: DashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until the host's slot is free, then claims it. The first
    /// request to a host proceeds immediately.
    pub async fn wait(&self, host: &str) {
        if self.delay.is_zero() {
            return;
        }
        let slot = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut last = slot.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_clamped_to_floor() {
        assert_eq!(Throttle::new(Duration::ZERO).delay(), HARD_FLOOR);
        assert_eq!(Throttle::new(Duration::from_millis(500)).delay(), HARD_FLOOR);
        assert_eq!(
            Throttle::new(Duration::from_secs(5)).delay(),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn paces_consecutive_requests_to_one_host() {
        let throttle = Throttle::new(Duration::from_secs(2));
        let start = Instant::now();
        throttle.wait("example.com").await;
        let first = start.elapsed();
        throttle.wait("example.com").await;
        let second = start.elapsed();

        assert!(first < Duration::from_millis(100), "first wait must be free");
        assert!(second >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn hosts_do_not_block_each_other() {
        let throttle = Throttle::new(Duration::from_secs(2));
        throttle.wait("a.example.com").await;
        let start = Instant::now();
        throttle.wait("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn disabled_throttle_never_sleeps() {
        let throttle = Throttle::none();
        let start = Instant::now();
        for _ in 0..3 {
            throttle.wait("example.com").await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
