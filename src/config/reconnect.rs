//! Reconnect policy and backoff.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::DisconnectReason;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// What the supervisor does when the server rejects the token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Give up permanently on `auth_invalid` and surface a fatal fault.
    #[default]
    StopOnUnauthorized,

    /// Keep retrying with backoff regardless of the failure class.
    AlwaysRetry,
}

impl ReconnectPolicy {
    /// Returns `true` if the supervisor must stop after `reason`.
    #[inline]
    #[must_use]
    pub fn gives_up_on(self, reason: DisconnectReason) -> bool {
        match reason {
            DisconnectReason::UserRequested => true,
            DisconnectReason::Unauthorized => self == Self::StopOnUnauthorized,
            _ => false,
        }
    }
}

// ============================================================================
// ReconnectConfig
// ============================================================================

/// Reconnect supervision settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Give-up policy.
    pub policy: ReconnectPolicy,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure.
    pub factor: f64,
    /// A connection that stayed up this long resets the backoff.
    pub stable_after: Duration,
    /// Give up after this many consecutive failed attempts (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            stable_after: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Validates the backoff parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on zero delays, inverted bounds or a factor
    /// below 1.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(Error::config("Initial reconnect delay must be > 0"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                "Max reconnect delay must be >= initial reconnect delay",
            ));
        }
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err(Error::config("Backoff factor must be >= 1.0"));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::config("Max reconnect attempts must be > 0 when set"));
        }
        Ok(())
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Capped exponential backoff: `initial * factor^n`, never above `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff at its minimum.
    #[must_use]
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: config.initial_delay,
            max: config.max_delay,
            factor: config.factor,
            attempt: 0,
        }
    }

    /// Returns the delay to wait now and advances to the next step.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.initial.as_secs_f64() * self.factor.powf(f64::from(self.attempt));
        let delay = base.min(self.max.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs_f64(delay)
    }

    /// Number of delays handed out since the last reset.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resets to the minimum delay.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial_ms: u64, max_ms: u64) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(&config(100, 500));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(&config(100, 10_000));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let mut backoff = Backoff::new(&config(1, 1000));
        for _ in 0..10_000 {
            assert!(backoff.next_delay() <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_validate() {
        assert!(ReconnectConfig::default().validate().is_ok());
        assert!(config(0, 10).validate().is_err());
        assert!(config(100, 10).validate().is_err());

        let bad_factor = ReconnectConfig { factor: 0.5, ..Default::default() };
        assert!(bad_factor.validate().is_err());
    }

    #[test]
    fn test_policy_gives_up() {
        use DisconnectReason::*;

        assert!(ReconnectPolicy::StopOnUnauthorized.gives_up_on(Unauthorized));
        assert!(!ReconnectPolicy::AlwaysRetry.gives_up_on(Unauthorized));
        assert!(ReconnectPolicy::AlwaysRetry.gives_up_on(UserRequested));
        for reason in [RemoteClosed, TransportError, Timeout, ProtocolError, NotReady] {
            assert!(!ReconnectPolicy::StopOnUnauthorized.gives_up_on(reason));
        }
    }
}
