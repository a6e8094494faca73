//! Throttling for "records dropped" warnings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between dropped-record warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Counts dropped records or bytes and reports them at most once per
/// interval.
///
/// Drops are accumulated with [`record_drops`] and reported by
/// [`warn_if_due`] once the interval since the last report has passed.
/// [`flush`] reports whatever is pending regardless of the interval and is
/// meant for shutdown paths. Nothing is reported while the counter is zero.
///
/// [`record_drops`]: RateLimitedWarner::record_drops
/// [`warn_if_due`]: RateLimitedWarner::warn_if_due
/// [`flush`]: RateLimitedWarner::flush
#[derive(Debug)]
pub struct RateLimitedWarner {
    interval: Duration,
    last_report: Mutex<Option<Instant>>,
    dropped: AtomicU64,
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl RateLimitedWarner {
    /// The first report is never delayed.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_drop(&self) {
        self.record_drops(1);
    }

    pub fn record_drops(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Drops not yet reported.
    pub fn pending(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Call `report` with the pending count when the interval has elapsed.
    pub fn warn_if_due(&self, report: impl FnOnce(u64)) {
        let mut last = self.last_report.lock();
        let now = Instant::now();
        if last.is_some_and(|at| now.duration_since(at) < self.interval) {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            *last = Some(now);
            drop(last);
            report(count);
        }
    }

    /// Report pending drops immediately.
    pub fn flush(&self, report: impl FnOnce(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            *self.last_report.lock() = Some(Instant::now());
            report(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn reports(warner: &RateLimitedWarner, batches: &[u64]) -> Vec<u64> {
        let mut seen = Vec::new();
        for &batch in batches {
            warner.record_drops(batch);
            warner.warn_if_due(|count| seen.push(count));
        }
        seen
    }

    #[rstest]
    fn first_report_is_immediate_then_throttled() {
        let warner = RateLimitedWarner::default();
        assert_eq!(reports(&warner, &[3, 2, 4]), vec![3]);
        assert_eq!(warner.pending(), 6);
    }

    #[rstest]
    fn flush_ignores_the_interval_once() {
        let warner = RateLimitedWarner::default();
        reports(&warner, &[1]);
        warner.record_drops(5);
        let mut seen = Vec::new();
        warner.flush(|count| seen.push(count));
        warner.flush(|count| seen.push(count));
        assert_eq!(seen, vec![5]);
    }

    #[rstest]
    fn nothing_is_reported_without_drops() {
        let warner = RateLimitedWarner::new(Duration::ZERO);
        let mut called = false;
        warner.warn_if_due(|_| called = true);
        warner.flush(|_| called = true);
        assert!(!called);
    }

    #[rstest]
    fn zero_interval_reports_every_batch() {
        let warner = RateLimitedWarner::new(Duration::ZERO);
        assert_eq!(reports(&warner, &[1, 2, 3]), vec![1, 2, 3]);
    }
}
