//! Exponential backoff for transient presence-fetch failures.
//!
//! When the presence API is unreachable or rate-limiting, the poll loop
//! stretches the gap between ticks instead of hammering the service.

use std::time::Duration;

/// Configuration for backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay between ticks when there is no failure.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to delay after each failure (typically 2.0).
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::for_interval(Duration::from_secs(2), 5)
    }
}

impl BackoffConfig {
    /// Backoff that starts at the poll interval and caps at
    /// `interval × max_factor`.
    pub fn for_interval(interval: Duration, max_factor: u32) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval.saturating_mul(max_factor.max(1)),
            multiplier: 2.0,
        }
    }
}

/// Backoff state machine.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    current_delay: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            consecutive_failures: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BackoffConfig::default())
    }

    /// Record a failed attempt, advance the backoff, and return the delay
    /// to wait before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures += 1;

        // Advance backoff: current_delay *= multiplier, capped at max_delay
        let next = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = Duration::try_from_secs_f64(next)
            .unwrap_or(Duration::MAX)
            .min(self.config.max_delay);
        self.current_delay
    }

    /// Like [`record_failure`](Self::record_failure), but never shorter than
    /// a server-provided hint (e.g. `Retry-After`). The cap still applies.
    pub fn record_failure_with_hint(&mut self, hint: Option<Duration>) -> Duration {
        let delay = self.record_failure();
        match hint {
            Some(h) if h > delay => {
                self.current_delay = h.min(self.config.max_delay);
                self.current_delay
            }
            _ => delay,
        }
    }

    /// Record a successful attempt and reset the backoff.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Number of consecutive failed attempts.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current delay before the next attempt.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.config.max_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn zero_factor_still_allows_interval() {
        let config = BackoffConfig::for_interval(Duration::from_secs(3), 0);
        assert_eq!(config.max_delay, Duration::from_secs(3));
    }

    #[test]
    fn initial_state() {
        let state = Backoff::with_defaults();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::from_secs(2));
    }

    #[test]
    fn backoff_progresses_on_failure() {
        let mut state = Backoff::new(BackoffConfig::for_interval(Duration::from_millis(100), 10));

        assert_eq!(state.record_failure(), Duration::from_millis(200));
        assert_eq!(state.consecutive_failures(), 1);
        assert_eq!(state.record_failure(), Duration::from_millis(400));
        assert_eq!(state.record_failure(), Duration::from_millis(800));
        assert_eq!(state.consecutive_failures(), 3);
    }

    #[test]
    fn backoff_capped_at_max() {
        let mut state = Backoff::new(BackoffConfig::for_interval(Duration::from_secs(2), 5));

        assert_eq!(state.record_failure(), Duration::from_secs(4));
        assert_eq!(state.record_failure(), Duration::from_secs(8));
        assert_eq!(state.record_failure(), Duration::from_secs(10));
        assert_eq!(state.record_failure(), Duration::from_secs(10));
    }

    #[test]
    fn delays_never_decrease() {
        let mut state = Backoff::new(BackoffConfig::for_interval(Duration::from_millis(30), 5));
        let mut prev = Duration::ZERO;
        for _ in 0..10 {
            let d = state.record_failure();
            assert!(d >= prev);
            assert!(d <= state.max_delay());
            prev = d;
        }
    }

    #[test]
    fn success_resets_backoff() {
        let mut state = Backoff::with_defaults();
        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures(), 2);

        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_delay(), Duration::from_secs(2));
        assert_eq!(state.record_failure(), Duration::from_secs(4));
    }

    #[test]
    fn hint_longer_than_backoff_wins() {
        let mut state = Backoff::new(BackoffConfig::for_interval(Duration::from_secs(2), 5));
        let d = state.record_failure_with_hint(Some(Duration::from_secs(7)));
        assert_eq!(d, Duration::from_secs(7));
        // Next failure continues from the raised delay
        assert_eq!(state.record_failure(), Duration::from_secs(10));
    }

    #[test]
    fn hint_is_capped() {
        let mut state = Backoff::new(BackoffConfig::for_interval(Duration::from_secs(2), 5));
        let d = state.record_failure_with_hint(Some(Duration::from_secs(120)));
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn shorter_hint_is_ignored() {
        let mut state = Backoff::new(BackoffConfig::for_interval(Duration::from_secs(2), 5));
        assert_eq!(
            state.record_failure_with_hint(Some(Duration::from_secs(1))),
            Duration::from_secs(4)
        );
    }
}
