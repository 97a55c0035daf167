//! Idle and dim timeout computation.
//!
//! Everything here is pure: the worker feeds in the current time, the time
//! of the last input event and the configured timeouts, and gets back how
//! long to wait before acting.

use std::time::{Duration, Instant};

/// Result of a timeout computation, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// The smallest enabled timeout.
    pub min_timeout: u64,
    /// Seconds until `min_timeout` is reached; zero once it has passed.
    pub time_left: u64,
    /// Seconds until the display should turn off; `None` when idle-off is disabled.
    pub time_to_off: Option<u64>,
}

/// Rounds an elapsed time to whole seconds, half a second rounding up.
pub fn idle_seconds(elapsed: Duration) -> u64 {
    (elapsed.as_millis() as u64 + 500) / 1000
}

/// The smallest enabled timeout, or `None` when nothing should ever fire.
///
/// Dimming is only considered when the display is not permanently off or
/// disabled (`idle_timeout` of 0 or -2).
pub fn min_timeout(idle_timeout: i32, dim_timeout: i32) -> Option<u64> {
    let min = match (idle_timeout, dim_timeout) {
        (-2 | 0, _) => return None,
        (-1, dim) => dim,
        (idle, dim) if dim <= 0 => idle,
        (idle, dim) => idle.min(dim),
    };
    u64::try_from(min).ok().filter(|&secs| secs > 0)
}

/// Compute the idle/dim timeouts at `now`.
///
/// Returns `None` when neither timeout is enabled.
pub fn compute(
    now: Instant,
    last_event_time: Instant,
    idle_timeout: i32,
    dim_timeout: i32,
) -> Option<Timeouts> {
    let min_timeout = min_timeout(idle_timeout, dim_timeout)?;
    let idle_time = idle_seconds(now.saturating_duration_since(last_event_time));

    let time_to_off = u64::try_from(idle_timeout)
        .ok()
        .filter(|&idle| idle > 0)
        .map(|idle| idle.saturating_sub(idle_time));

    Some(Timeouts {
        min_timeout,
        time_left: min_timeout.saturating_sub(idle_time),
        time_to_off,
    })
}
