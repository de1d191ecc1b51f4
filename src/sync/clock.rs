// ABOUTME: Server clock offset estimator
// ABOUTME: Turns latency samples from TIME round-trips into a server-time view

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;
use crate::sync::median::MedianFilter;

pub const LATENCY_MEDIAN_FILTER_LEN: usize = 199;

/// Maintains `offset_to_server_us`, the estimated offset between the local wall clock and the
/// server's wall clock, derived from a median of round-trip latency samples. A mutex-guarded
/// median filter feeds a cached offset that's read back in a best-effort, non-blocking fashion.
pub struct ClockEstimator {
    filter: Mutex<MedianFilter>,
    cached_offset_us: AtomicI64,
}

impl ClockEstimator {
    pub fn new() -> Self {
        Self::with_window(LATENCY_MEDIAN_FILTER_LEN)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            filter: Mutex::new(MedianFilter::new(window)),
            cached_offset_us: AtomicI64::new(0),
        }
    }

    /// Push a new latency sample (microseconds, signed) through the median filter and update the
    /// cached offset to its output.
    pub fn insert_latency(&self, us: i64) {
        let mut filter = self.filter.lock().unwrap();
        let median = filter.insert(us);
        self.cached_offset_us.store(median, Ordering::Relaxed);
    }

    /// Reinitialize the filter and the offset. `is_ready()` becomes false until `window` more
    /// samples have been inserted.
    pub fn reset(&self) {
        let mut filter = self.filter.lock().unwrap();
        filter.reset();
        self.cached_offset_us.store(0, Ordering::Relaxed);
    }

    /// Best-effort offset read. Never blocks: under contention this returns the last
    /// successfully observed value, which is acceptable staleness for this estimator.
    pub fn offset(&self) -> i64 {
        if let Ok(filter) = self.filter.try_lock() {
            if filter.is_empty() {
                return 0;
            }
        }
        self.cached_offset_us.load(Ordering::Relaxed)
    }

    pub fn is_ready(&self) -> bool {
        match self.filter.try_lock() {
            Ok(filter) => filter.is_full(),
            Err(_) => false,
        }
    }

    /// Current server time estimate in microseconds. Fails with `NotSynchronized` if the
    /// estimator hasn't produced a non-zero offset yet or the filter isn't full.
    pub fn server_now(&self) -> Result<i64, Error> {
        let offset = self.offset();
        if offset == 0 || !self.is_ready() {
            return Err(Error::NotSynchronized);
        }
        Ok(gettimeofday_us() + offset)
    }
}

impl Default for ClockEstimator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn gettimeofday_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_micros() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_then_n_minus_one_inserts_keeps_not_ready() {
        let est = ClockEstimator::with_window(5);
        est.reset();
        for _ in 0..4 {
            est.insert_latency(10);
        }
        assert!(!est.is_ready());
        est.insert_latency(10);
        assert!(est.is_ready());
    }

    #[test]
    fn not_synchronized_before_ready() {
        let est = ClockEstimator::with_window(3);
        assert!(matches!(est.server_now(), Err(Error::NotSynchronized)));
    }

    #[test]
    fn server_now_monotonic_under_constant_offset() {
        let est = ClockEstimator::with_window(3);
        for _ in 0..3 {
            est.insert_latency(500);
        }
        assert!(est.is_ready());
        let t1 = est.server_now().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let t2 = est.server_now().unwrap();
        assert!(t2 >= t1);
    }

    #[test]
    fn offset_is_median_not_raw_sample() {
        let est = ClockEstimator::with_window(3);
        est.insert_latency(100);
        est.insert_latency(100_000); // outlier
        est.insert_latency(110);
        // median of {100, 100_000, 110} is 110
        assert_eq!(est.offset(), 110);
    }

    #[test]
    fn reset_drops_offset_to_zero() {
        let est = ClockEstimator::with_window(3);
        for _ in 0..3 {
            est.insert_latency(250);
        }
        assert_eq!(est.offset(), 250);
        est.reset();
        assert_eq!(est.offset(), 0);
    }
}
