//! Exponential backoff with jitter, bounded by total elapsed time.

use ferry_core::config::TransportConfig;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff parameters shared by every reconnection loop.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    /// Each delay is drawn uniformly from `interval * (1 +/- randomization)`.
    pub randomization: f64,
}

impl BackoffPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            initial: config.reconnect_initial(),
            multiplier: config.reconnect_multiplier,
            max_interval: config.reconnect_max_interval(),
            max_elapsed: config.reconnect_max_elapsed(),
            randomization: config.reconnect_randomization,
        }
    }

    /// Start a new backoff sequence, timed from now.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            current: self.initial,
            started: Instant::now(),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

/// One running backoff sequence.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    started: Instant,
}

impl Backoff {
    /// Next delay to sleep, or `None` once the elapsed budget is spent.
    ///
    /// A delay never extends past the elapsed budget.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.policy.max_elapsed {
            return None;
        }

        let delay = jitter(self.current, self.policy.randomization);
        self.current = self
            .current
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_interval);

        Some(delay.min(self.policy.max_elapsed - elapsed))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Interval the next delay is jittered around.
    pub fn current_interval(&self) -> Duration {
        self.current
    }
}

fn jitter(interval: Duration, randomization: f64) -> Duration {
    if randomization <= 0.0 || interval.is_zero() {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let delta = secs * randomization.min(1.0);
    Duration::from_secs_f64(rand::rng().random_range((secs - delta)..=(secs + delta)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(randomization: f64) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(2),
            randomization,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_intervals_grow_and_cap() {
        let mut backoff = policy(0.0).start();
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_stays_in_band() {
        let mut backoff = policy(0.5).start();
        for _ in 0..50 {
            let interval = backoff.current_interval().as_secs_f64();
            let delay = backoff.next_delay().unwrap().as_secs_f64();
            assert!(delay >= interval * 0.5 - 1e-6 && delay <= interval * 1.5 + 1e-6);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_max_elapsed() {
        let mut backoff = policy(0.0).start();
        let mut slept = Duration::ZERO;
        while let Some(delay) = backoff.next_delay() {
            tokio::time::sleep(delay).await;
            slept += delay;
        }
        assert_eq!(slept, Duration::from_secs(2));
        assert!(backoff.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_default_policy_uses_documented_values() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.multiplier, 1.1);
        assert_eq!(policy.max_elapsed, Duration::from_secs(120));
    }
}
