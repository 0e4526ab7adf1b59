//! Retry delays for transient frame source failures.

use std::time::Duration;

/// Delay policy applied between retries of a failing frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Same delay every time.
    Fixed { delay: Duration },
    /// Doubles after each consecutive failure, capped at `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        attempt: u32,
    },
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy::Fixed { delay }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        BackoffPolicy::Exponential {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next retry. Advances the exponential schedule.
    pub fn next_delay(&mut self) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential {
                initial,
                max,
                attempt,
            } => {
                let factor = 1u32.checked_shl(*attempt).unwrap_or(u32::MAX);
                let delay = initial.saturating_mul(factor).min(*max);
                *attempt = attempt.saturating_add(1);
                delay
            }
        }
    }

    /// Forget previous failures. Called after a successful frame.
    pub fn reset(&mut self) {
        if let BackoffPolicy::Exponential { attempt, .. } = self {
            *attempt = 0;
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}
