//! Exponential backoff between dial attempts.

use std::time::Duration;

/// First delay after a failed dial (2s).
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Upper bound for the delay (30s).
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Doubling delay, capped.
///
/// ```
/// use linefan::worker::Backoff;
/// use std::time::Duration;
///
/// let mut backoff = Backoff::default();
/// assert_eq!(backoff.next_delay(), Duration::from_secs(2));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial.min(max),
        }
    }

    /// Returns the delay to sleep now and doubles the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    /// The delay the next call to [`Backoff::next_delay`] will return.
    pub fn peek(&self) -> Duration {
        self.next
    }

    /// Starts over from the initial delay (after a successful connect).
    pub fn reset(&mut self) {
        self.next = self.initial.min(self.max);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}
