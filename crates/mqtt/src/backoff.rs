//! Exponential backoff for broker reconnection.
//!
//! ```text
//! delay[n] = min(initial * multiplier^(n-1), max_delay)
//! ```
//!
//! With `initial = 1s`, `multiplier = 2.0`, `max = 60s` the kernel waits
//! 1s, 2s, 4s, ... 32s, 60s, 60s, ... between attempts. Unlike a one-shot
//! client, a daemon is expected to keep trying forever, so attempts are only
//! limited when [`Backoff::set_max_attempts`] is called.
//!
//! ```ignore
//! let mut backoff = Backoff::default();
//! let delay = backoff.next_sleep()?;   // 1s
//! let delay = backoff.next_sleep()?;   // 2s
//! backoff.reset();                     // connection succeeded
//! ```

use std::time::Duration;

use thiserror::Error;

/// Error type for backoff exhaustion.
#[derive(Debug, Error)]
pub enum BackoffError {
    /// Maximum retry attempts exceeded with the given limit.
    #[error("Maximum number of attempts exceeded: {0}")]
    MaxAttemptLimitError(u32),
}

/// Exponential backoff controller for reconnection timing.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,

    /// Delay returned by the next call to `next_sleep`.
    current_delay: Duration,

    max_delay: Duration,

    /// Growth factor applied after each attempt. Values <= 1.0 keep the delay flat.
    multiplier: f64,

    /// Attempts since the last reset.
    attempt: u32,

    /// Hard limit on attempts; `None` retries forever.
    max_attempts: Option<u32>,
}

impl Backoff {
    /// Creates a backoff controller with custom timing parameters.
    ///
    /// An `initial` delay above `max` is clamped to `max`.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = initial.min(max);
        Self {
            initial_delay: initial,
            current_delay: initial,
            max_delay: max,
            multiplier,
            attempt: 0,
            max_attempts: None,
        }
    }

    /// Limits the number of attempts between resets. `0` fails on the first call.
    pub fn set_max_attempts(&mut self, max: u32) {
        self.max_attempts = Some(max);
    }

    /// Resets the controller after a successful connection.
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    /// Returns the next sleep duration and advances the controller.
    ///
    /// # Errors
    ///
    /// Returns `BackoffError::MaxAttemptLimitError` once an explicit attempt
    /// limit has been exceeded.
    pub fn next_sleep(&mut self) -> Result<Duration, BackoffError> {
        self.attempt += 1;

        if let Some(limit) = self.max_attempts {
            if self.attempt > limit {
                return Err(BackoffError::MaxAttemptLimitError(limit));
            }
        }

        let sleep = self.current_delay;

        if self.multiplier > 1.0 {
            let next_secs = self.current_delay.as_secs_f64() * self.multiplier;
            self.current_delay = Duration::from_secs_f64(next_secs).min(self.max_delay);
        }

        Ok(sleep)
    }

    /// Gets the configured maximum delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Gets the explicit maximum attempts limit, if set.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Gets the attempt count since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Gets the delay the next `next_sleep` call will return.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

impl Default for Backoff {
    /// 1 second initial delay, doubling, capped at 60 seconds, unlimited attempts.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_default_creation() {
        let backoff = Backoff::default();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.current_delay(), Duration::from_secs(1));
        assert_eq!(backoff.max_delay(), Duration::from_secs(60));
        assert_eq!(backoff.max_attempts(), None);
    }

    #[test]
    fn test_backoff_next_sleep_progression() {
        let mut backoff = Backoff::default();

        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(1));
        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(2));
        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_respects_max_delay() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 3.0);

        let delays: Vec<_> = (0..6).map(|_| backoff.next_sleep().unwrap()).collect();

        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(3));
        assert_eq!(delays[2], Duration::from_secs(9));
        assert!(delays[3..].iter().all(|d| *d == Duration::from_secs(10)));
    }

    #[test]
    fn test_backoff_unlimited_by_default() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(2), 2.0);
        for _ in 0..1_000 {
            assert!(backoff.next_sleep().is_ok());
        }
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default();

        backoff.next_sleep().unwrap();
        backoff.next_sleep().unwrap();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.current_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_max_attempts_exceeded() {
        let mut backoff = Backoff::default();
        backoff.set_max_attempts(2);

        let _ = backoff.next_sleep();
        let _ = backoff.next_sleep();
        let result = backoff.next_sleep();

        assert!(matches!(result, Err(BackoffError::MaxAttemptLimitError(2))));
    }

    #[test]
    fn test_backoff_flat_multiplier() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(60), 0.9);
        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(5));
        assert_eq!(backoff.next_sleep().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_initial_clamped_to_max() {
        let backoff = Backoff::new(Duration::from_secs(90), Duration::from_secs(60), 2.0);
        assert_eq!(backoff.current_delay(), Duration::from_secs(60));
    }
}
