//! Fixed-delay retry budget, one per connection stage.

use core::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the delay, then try again.
    RetryAfter(Duration),
    /// The bounded budget is spent.
    Exhausted { attempts: u32 },
}

/// Attempt counter with an optional ceiling and a fixed inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts: u32,
    max_attempts: Option<u32>,
    delay: Duration,
}

impl RetryBudget {
    /// `max_attempts` total attempts, `max_attempts - 1` sleeps.
    pub const fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts: Some(max_attempts),
            delay,
        }
    }

    pub const fn unbounded(delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts: None,
            delay,
        }
    }

    /// Count a failed attempt and decide whether another is allowed.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        match self.max_attempts {
            Some(max) if self.attempts >= max => RetryDecision::Exhausted {
                attempts: self.attempts,
            },
            _ => RetryDecision::RetryAfter(self.delay),
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
