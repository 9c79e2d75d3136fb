//! Clock seam
//!
//! Implementations live in [`crate::time`]: `SystemTime` (Unix epoch, can
//! jump when NTP corrects it), `MonotonicTime` (since process start) and
//! `MockTimeSource` (shared, advanced by hand in tests).

use crate::time::Timestamp;

/// Millisecond clock consulted by every scheduled step
///
/// ## Wall Clock vs Monotonic
///
/// The distinction matters to the session manager. A credential persisted
/// with an absolute expiry can only be trusted after a reboot when `now()`
/// is anchored to the Unix epoch. With a monotonic source every boot starts
/// near zero, so a restored expiry would look valid for far too long.
pub trait TimeSource: Send {
    /// Milliseconds since the Unix epoch, or since start for monotonic sources
    fn now(&self) -> Timestamp;

    /// Whether `now()` is anchored to the Unix epoch
    fn is_wall_clock(&self) -> bool;
}

impl<T: TimeSource + Sync + ?Sized> TimeSource for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }

    fn is_wall_clock(&self) -> bool {
        (**self).is_wall_clock()
    }
}
