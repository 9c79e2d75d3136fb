//! Time management for field devices
//!
//! Provides clock implementations behind [`TimeSource`]:
//! - System clock (wall time, needed for persisted credentials and timestamps)
//! - Monotonic clock (interval scheduling when wall time is unavailable)
//! - A shared mock clock for tests
//!
//! and [`IntervalTimer`], the gate used by every scheduled step of the
//! control loop.

use alloc::string::String;

pub use crate::traits::TimeSource;

/// Timestamp in milliseconds since epoch (or device boot for monotonic)
pub type Timestamp = u64;

/// Monotonic time source measured from construction
///
/// Never jumps, but carries no calendar meaning. Credentials cannot be
/// restored across reboots with this source.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicTime {
    /// Start counting from now
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for MonotonicTime {
    fn now(&self) -> Timestamp {
        self.start.elapsed().as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// System time source (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default)]
pub struct SystemTime;

#[cfg(feature = "std")]
impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Controllable clock whose clones all observe the same time
///
/// The session manager and the control loop each own a boxed clock; handing
/// them clones of one `MockTimeSource` lets a test advance both at once.
#[cfg(target_has_atomic = "64")]
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    now: alloc::sync::Arc<core::sync::atomic::AtomicU64>,
    wall_clock: bool,
}

#[cfg(target_has_atomic = "64")]
impl MockTimeSource {
    /// Wall-clock mock starting at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: alloc::sync::Arc::new(core::sync::atomic::AtomicU64::new(start)),
            wall_clock: true,
        }
    }

    /// Mock that reports itself as a monotonic source
    pub fn monotonic(start: Timestamp) -> Self {
        Self { wall_clock: false, ..Self::new(start) }
    }

    /// Move every clone forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, core::sync::atomic::Ordering::SeqCst);
    }

    /// Set every clone to `timestamp`, which may be in the past
    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, core::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(target_has_atomic = "64")]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.now.load(core::sync::atomic::Ordering::SeqCst)
    }

    fn is_wall_clock(&self) -> bool {
        self.wall_clock
    }
}

/// Gate for a periodic step
///
/// Due on the first check after construction, then every `interval_ms`. A
/// clock that jumps backwards makes the timer due immediately rather than
/// stalling it until the clock catches up.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    interval_ms: u64,
    last: Option<Timestamp>,
}

impl IntervalTimer {
    /// Timer firing every `interval_ms`
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms, last: None }
    }

    /// Configured period
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Whether the step should run at `now`
    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.last {
            None => true,
            Some(last) if now < last => true,
            Some(last) => now - last >= self.interval_ms,
        }
    }

    /// Record that the step ran at `now`
    pub fn mark(&mut self, now: Timestamp) {
        self.last = Some(now);
    }

    /// Check and mark in one go
    pub fn poll(&mut self, now: Timestamp) -> bool {
        if self.is_due(now) {
            self.mark(now);
            true
        } else {
            false
        }
    }
}

/// Format a wall-clock timestamp as RFC 3339 with millisecond precision
///
/// Returns `None` for values chrono cannot represent.
pub fn to_rfc3339(timestamp: Timestamp) -> Option<String> {
    let millis = i64::try_from(timestamp).ok()?;
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clones_share_time() {
        let a = MockTimeSource::new(10);
        let b = a.clone();
        a.advance(90);
        assert_eq!(b.now(), 100);
        assert!(b.is_wall_clock());
        assert!(!MockTimeSource::monotonic(0).is_wall_clock());
    }

    #[test]
    fn interval_timer_due_at_start_then_periodic() {
        let mut timer = IntervalTimer::new(5000);
        assert!(timer.poll(0));
        assert!(!timer.poll(4999));
        assert!(timer.poll(5000));
        assert!(!timer.is_due(9999));
        assert!(timer.is_due(10_000));
    }

    #[test]
    fn interval_timer_handles_backwards_clock() {
        let mut timer = IntervalTimer::new(60_000);
        timer.mark(1_000_000);
        assert!(timer.is_due(500));
    }

    #[test]
    fn rfc3339_formatting() {
        assert_eq!(
            to_rfc3339(1_700_000_000_123).as_deref(),
            Some("2023-11-14T22:13:20.123Z")
        );
    }
}
