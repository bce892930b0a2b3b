//! Run counters and throttled progress reporting.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

/// Cell tallies. Kept per band and cumulatively by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub completed: usize,
    /// Cells with a data gap (no climate, masked out, write failure).
    pub skipped: usize,
    /// Cells dropped for having no soil at all.
    pub soilless: usize,
    pub warning_count: usize,
    pub landuse_yes: usize,
    pub landuse_no: usize,
}

impl RunCounters {
    pub fn add(&mut self, other: &RunCounters) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.soilless += other.soilless;
        self.warning_count += other.warning_count;
        self.landuse_yes += other.landuse_yes;
        self.landuse_no += other.landuse_no;
    }
}

/// What a progress sink is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub band: usize,
    /// Cells completed so far in the whole run.
    pub completed: usize,
    /// Cells in the current band (or the whole AOI for band-free exports).
    pub total: usize,
    pub skipped: usize,
    pub warnings: usize,
}

/// Progress capability injected into the driver.
pub trait ProgressSink {
    fn report(&mut self, snapshot: &ProgressSnapshot);

    /// Give the host a chance to process pending events during long fetches.
    fn pump(&mut self) {}
}

/// Default sink: progress goes to the log.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, s: &ProgressSnapshot) {
        info!(
            band = s.band,
            completed = s.completed,
            total = s.total,
            skipped = s.skipped,
            warnings = s.warnings,
            "progress"
        );
    }
}

/// Time-based throttle in front of a [`ProgressSink`].
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Report if at least `interval` has elapsed since the last report.
    /// The first call always reports. Returns whether a report was made.
    pub fn maybe_report(&mut self, now: Instant, sink: &mut dyn ProgressSink, snapshot: &ProgressSnapshot) -> bool {
        let due = self.last.map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            sink.report(snapshot);
            self.last = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<ProgressSnapshot>);
    impl ProgressSink for Recorder {
        fn report(&mut self, s: &ProgressSnapshot) {
            self.0.push(*s);
        }
    }

    fn snap(completed: usize) -> ProgressSnapshot {
        ProgressSnapshot { band: 1, completed, total: 10, skipped: 0, warnings: 0 }
    }

    #[test]
    fn throttle_suppresses_reports_within_interval() {
        let mut sink = Recorder::default();
        let mut throttle = ProgressThrottle::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(throttle.maybe_report(t0, &mut sink, &snap(1)));
        assert!(!throttle.maybe_report(t0 + Duration::from_secs(3), &mut sink, &snap(2)));
        assert!(!throttle.maybe_report(t0 + Duration::from_secs(9), &mut sink, &snap(3)));
        assert!(throttle.maybe_report(t0 + Duration::from_secs(10), &mut sink, &snap(4)));

        let reported: Vec<usize> = sink.0.iter().map(|s| s.completed).collect();
        assert_eq!(reported, vec![1, 4]);
    }

    #[test]
    fn counters_accumulate() {
        let mut total = RunCounters::default();
        let band = RunCounters { completed: 3, skipped: 1, landuse_no: 1, ..Default::default() };
        total.add(&band);
        total.add(&band);
        assert_eq!(total.completed, 6);
        assert_eq!(total.skipped, 2);
        assert_eq!(total.landuse_no, 2);
    }
}
