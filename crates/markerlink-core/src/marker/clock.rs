//! Microsecond clock

use chrono::Utc;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Zero-argument function returning non-decreasing microsecond timestamps
pub type TimeFn = Arc<dyn Fn() -> i64 + Send + Sync>;

static ANCHOR: OnceLock<(Instant, i64)> = OnceLock::new();

/// Monotonic clock in microseconds since the UNIX epoch.
///
/// The wall clock is read once; later readings advance with `Instant`, so the
/// clock never goes backwards when the system time is adjusted.
pub fn system_clock() -> TimeFn {
    Arc::new(now_us)
}

fn now_us() -> i64 {
    let (start, epoch_us) = ANCHOR.get_or_init(|| (Instant::now(), Utc::now().timestamp_micros()));
    epoch_us + start.elapsed().as_micros() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = system_clock();
        let a = clock();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock();
        assert!(b >= a + 2_000);
    }

    #[test]
    fn test_system_clock_near_wall_time() {
        let clock = system_clock();
        let wall = Utc::now().timestamp_micros();
        // Anchored on first use, so within a generous margin of wall time
        assert!((clock() - wall).abs() < 60_000_000);
    }
}
