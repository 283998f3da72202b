//! Timing helpers for benchmark callers.

use std::sync::OnceLock;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

fn epoch() -> std::time::Instant {
    static EPOCH: OnceLock<std::time::Instant> = OnceLock::new();
    *EPOCH.get_or_init(std::time::Instant::now)
}

/// A monotonic time point, stored as nanoseconds since a process-wide epoch
/// so it can cross the C ABI as a plain integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant {
    nanos: u64,
}

impl Instant {
    pub fn now() -> Self {
        let nanos = epoch().elapsed().as_nanos();
        Self {
            nanos: u64::try_from(nanos).unwrap_or(u64::MAX),
        }
    }

    pub fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub fn as_nanos(self) -> u64 {
        self.nanos
    }

    pub fn as_secs_f64(self) -> f64 {
        Duration::from_nanos(self.nanos).as_secs_f64()
    }

    pub fn elapsed(self) -> Duration {
        Duration::from_nanos(Self::now().nanos.saturating_sub(self.nanos))
    }

    pub fn elapsed_seconds(self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Wall-clock stopwatch; coarse, and it jumps when the system clock does.
#[derive(Clone, Copy, Debug)]
pub struct WallTimer {
    start: SystemTime,
}

impl WallTimer {
    pub fn start() -> Self {
        Self {
            start: SystemTime::now(),
        }
    }

    /// Seconds since the Unix epoch at which the timer started.
    pub fn started_at(&self) -> f64 {
        self.start
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn from_started_at(secs: f64) -> Self {
        let start = Duration::try_from_secs_f64(secs)
            .ok()
            .and_then(|d| UNIX_EPOCH.checked_add(d))
            .unwrap_or(UNIX_EPOCH);
        Self { start }
    }

    /// Zero if the clock went backwards.
    pub fn elapsed_seconds(&self) -> f64 {
        self.start
            .elapsed()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Blocks the calling thread; negative, NaN or unrepresentable input sleeps
/// for zero.
pub fn sleep_seconds(secs: f64) {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) => std::thread::sleep(d),
        Err(err) => tracing::debug!(secs, %err, "not sleeping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_is_monotonic() {
        let a = Instant::now();
        sleep_seconds(0.01);
        let b = Instant::now();
        assert!(b > a);
        assert!(a.elapsed_seconds() >= 0.01);
        assert!(b.as_secs_f64() >= a.as_secs_f64());
    }

    #[test]
    fn instant_nanos_round_trip() {
        let a = Instant::now();
        assert_eq!(Instant::from_nanos(a.as_nanos()), a);
        assert_eq!(Instant::from_nanos(1_500_000_000).as_secs_f64(), 1.5);
    }

    #[test]
    fn wall_timer_measures() {
        let t = WallTimer::start();
        sleep_seconds(0.01);
        assert!(t.elapsed_seconds() > 0.0);

        let again = WallTimer::from_started_at(t.started_at());
        assert!(again.elapsed_seconds() > 0.0);
    }

    #[test]
    fn bad_sleep_is_a_no_op() {
        let a = Instant::now();
        sleep_seconds(-1.0);
        sleep_seconds(f64::NAN);
        assert!(a.elapsed_seconds() < 1.0);
    }
}
