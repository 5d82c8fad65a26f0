//! Progress reporting for the pipeline stages

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Receives progress updates; both levels report a percentage (0-100)
pub trait ProgressReporter: Send + Sync {
    /// Whole-run progress
    fn overall(&self, _percent: u8, _message: &str) {}

    /// Progress within the album currently being processed
    fn album(&self, _percent: u8, _message: &str) {}
}

/// Reporter that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

/// Reporter that forwards updates to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn overall(&self, percent: u8, message: &str) {
        info!(percent, "{}", message);
    }

    fn album(&self, percent: u8, message: &str) {
        debug!(percent, "{}", message);
    }
}

/// Convert a fraction of work into a percentage
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Counts finished work units from several workers and only lets
/// percentages through that never go backwards
#[derive(Debug)]
pub struct ProgressCounter {
    total: usize,
    finished: AtomicUsize,
    reported: Mutex<u8>,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            finished: AtomicUsize::new(0),
            reported: Mutex::new(0),
        }
    }

    /// Mark one unit finished and pass the new percentage to `report` when
    /// it grew
    ///
    /// `report` runs under the counter's lock, so concurrent workers deliver
    /// their percentages in increasing order.
    pub fn finish_one(&self, report: impl FnOnce(u8)) {
        let done = self.finished.fetch_add(1, Ordering::AcqRel) + 1;
        let pct = percent(done, self.total);

        let mut reported = self
            .reported
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if pct > *reported {
            *reported = pct;
            report(pct);
        }
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 4), 0);
        assert_eq!(percent(1, 4), 25);
        assert_eq!(percent(4, 4), 100);
        assert_eq!(percent(5, 4), 100);
        assert_eq!(percent(0, 0), 100);
    }

    fn collect(counter: &ProgressCounter, units: usize) -> Vec<u8> {
        let mut reported = Vec::new();
        for _ in 0..units {
            counter.finish_one(|pct| reported.push(pct));
        }
        reported
    }

    #[test]
    fn test_counter_is_monotonic() {
        let counter = ProgressCounter::new(3);
        assert_eq!(collect(&counter, 4), vec![33, 66, 100]);
        assert_eq!(counter.finished(), 4);
    }

    #[test]
    fn test_counter_skips_unchanged_percentages() {
        let counter = ProgressCounter::new(1000);
        let reported = collect(&counter, 1000);
        assert_eq!(reported.len(), 100);
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_concurrent_reports_arrive_in_order() {
        let counter = ProgressCounter::new(4000);
        let reported = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        counter.finish_one(|pct| reported.lock().unwrap().push(pct));
                    }
                });
            }
        });

        let reported = reported.into_inner().unwrap();
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(reported.last(), Some(&100));
    }
}
