//! Drift-free periodic due-time gate.
//!
//! A [`Deadline`] answers "has the next period elapsed?" for one producer.
//! Due times advance by exactly one period from the previous due time, never
//! from "now", so the long-run average rate matches the target even when
//! ticks arrive late. A consumer that stalls for several periods fires once
//! per poll until it catches up rather than bursting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::BridgeError;

/// Source of the current time for the tick loop.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can hold one handle while the
/// session manager reads another.
///
/// # Example
///
/// ```
/// use stream_bridge::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_millis(16));
/// assert_eq!(clock.now() - start, Duration::from_millis(16));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, to: Instant) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// One tick as seen by the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Instant the tick started.
    pub now: Instant,
    /// Time since the session was initialized; used as the submission timestamp.
    pub elapsed: Duration,
}

impl Tick {
    /// Creates a tick at `now` for a session initialized at `epoch`.
    #[must_use]
    pub fn new(now: Instant, epoch: Instant) -> Self {
        Self {
            now,
            elapsed: now.saturating_duration_since(epoch),
        }
    }
}

/// Longest period a rate may have: one day.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Validates a rate and returns its period.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidRate`] if the rate is not finite or not
/// positive. Also returned when its period rounds to zero or exceeds
/// [`MAX_INTERVAL`].
pub fn check_rate(rate: f64) -> Result<Duration, BridgeError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(BridgeError::InvalidRate { rate });
    }
    match Duration::try_from_secs_f64(1.0 / rate) {
        Ok(interval) if !interval.is_zero() && interval <= MAX_INTERVAL => Ok(interval),
        _ => Err(BridgeError::InvalidRate { rate }),
    }
}

/// Periodic due-time gate for one producer.
///
/// # Example
///
/// ```
/// use stream_bridge::Deadline;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let mut deadline = Deadline::new(10.0, start).unwrap();
///
/// assert!(deadline.poll(start));
/// assert!(!deadline.poll(start + Duration::from_millis(50)));
/// assert!(deadline.poll(start + Duration::from_millis(100)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Deadline {
    rate: f64,
    interval: Duration,
    next_due_at: Instant,
}

impl Deadline {
    /// Creates a deadline that is first due at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidRate`] for a rate [`check_rate`] rejects.
    pub fn new(rate: f64, start: Instant) -> Result<Self, BridgeError> {
        let interval = check_rate(rate)?;
        Ok(Self {
            rate,
            interval,
            next_due_at: start,
        })
    }

    /// Returns `true` once `now` has reached the next due time.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due_at
    }

    /// Moves the next due time forward by one period.
    ///
    /// If the platform cannot represent the next instant, the due time stays
    /// where it is.
    pub fn advance(&mut self) {
        match self.next_due_at.checked_add(self.interval) {
            Some(next) => self.next_due_at = next,
            None => warn!(interval = ?self.interval, "deadline overflowed the clock; not advanced"),
        }
    }

    /// Checks whether the deadline is due and advances it if so.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = self.is_due(now);
        if due {
            self.advance();
        }
        due
    }

    /// Changes the rate. The new period applies from the next [`advance`].
    ///
    /// [`advance`]: Deadline::advance
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidRate`] and keeps the previous rate.
    pub fn set_rate(&mut self, rate: f64) -> Result<(), BridgeError> {
        self.interval = check_rate(rate)?;
        self.rate = rate;
        Ok(())
    }

    /// Re-anchors the schedule so the deadline is next due at `start`.
    pub fn reset(&mut self, start: Instant) {
        self.next_due_at = start;
    }

    /// Current rate in periods per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Current period.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Next due instant.
    #[must_use]
    pub fn next_due_at(&self) -> Instant {
        self.next_due_at
    }
}
