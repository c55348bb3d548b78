use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Default, Clone, Copy)]
struct HostState {
    failures: u32,
    tripped_at: Option<Instant>,
}

/// Per-host circuit breaker: trips after a run of consecutive failures and
/// half-opens after the cooldown, letting a single probe decide.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    hosts: DashMap<String, HostState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            hosts: DashMap::new(),
        }
    }

    pub fn record_success(&self, host: &str) {
        self.hosts.remove(host);
    }

    pub fn record_failure(&self, host: &str) {
        let mut state = self.hosts.entry(host.to_string()).or_default();
        state.failures += 1;
        if state.failures >= self.threshold && state.tripped_at.is_none() {
            state.tripped_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self, host: &str) -> bool {
        let tripped_at = match self.hosts.get(host).and_then(|s| s.tripped_at) {
            Some(t) => t,
            None => return false,
        };
        if tripped_at.elapsed() >= self.cooldown {
            // Half-open: clear state so the next request probes the host.
            self.hosts.remove(host);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_at_threshold() {
        let breaker = CircuitBreaker::default();
        for _ in 0..4 {
            breaker.record_failure("example.com");
            assert!(!breaker.is_open("example.com"));
        }
        breaker.record_failure("example.com");
        assert!(breaker.is_open("example.com"));
    }

    #[test]
    fn success_resets_failure_run() {
        let breaker = CircuitBreaker::default();
        for _ in 0..4 {
            breaker.record_failure("example.com");
        }
        breaker.record_success("example.com");
        breaker.record_failure("example.com");
        assert!(!breaker.is_open("example.com"));
    }

    #[test]
    fn half_opens_after_cooldown() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));
        breaker.record_failure("example.com");
        breaker.record_failure("example.com");
        assert!(breaker.is_open("example.com"));

        std::thread::sleep(Duration::from_millis(30));
        assert!(!breaker.is_open("example.com"));
        // One fresh failure must not re-trip immediately after the probe.
        breaker.record_failure("example.com");
        assert!(!breaker.is_open("example.com"));
    }

    #[test]
    fn hosts_are_independent() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure("a.example.com");
        assert!(breaker.is_open("a.example.com"));
        assert!(!breaker.is_open("b.example.com"));
    }
}
