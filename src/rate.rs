use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use slog::{info, o};

use crate::message::PodReadCount;
use crate::queue::OverflowQueue;
use crate::timestamped_counts::TimestampedCounts;
use crate::Config;

/// Current wall clock in seconds, truncated down to a multiple of `width`.
///
/// The reader and the writers of an engine may sit on different clocks; the skew
/// only shifts which buckets fall inside a lookback window.
#[inline]
pub fn now_aligned(width: Duration) -> i64 {
    align(chrono::Utc::now().timestamp(), width)
}

#[inline]
pub fn align(ts: i64, width: Duration) -> i64 {
    let width = (width.as_secs() as i64).max(1);
    ts - ts.rem_euclid(width)
}

/// Windowed throughput of one vertex, per partition.
///
/// Pods report cumulative read counts into time-aligned buckets. A bucket is closed
/// once a later bucket starts, and only closed buckets take part in a rate. Every
/// path without a usable signal yields `0.0` instead of an error.
pub struct RateEngine {
    history: OverflowQueue<Arc<TimestampedCounts>>,
    // find-or-create of a bucket must not interleave between writers
    write_lock: Mutex<()>,
    bucket_width: Duration,
    lookback: Duration,
    logger: slog::Logger,
}

impl RateEngine {
    pub fn new(vertex: &str, cfg: Config, logger: &slog::Logger) -> Self {
        Self {
            history: OverflowQueue::new(cfg.capacity),
            write_lock: Mutex::new(()),
            bucket_width: cfg.bucket_width,
            lookback: cfg.lookback,
            logger: logger.new(o!("vertex" => vertex.to_owned())),
        }
    }

    #[inline]
    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    #[inline]
    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Ordered snapshot of the buckets currently held, oldest first.
    #[inline]
    pub fn history(&self) -> Vec<Arc<TimestampedCounts>> {
        self.history.items()
    }

    /// Records a pod report at `timestamp`, which callers align to the bucket width.
    ///
    /// A report for a new timestamp closes the most recent bucket before the new one
    /// is appended. Timestamps must be non-decreasing per engine.
    pub fn record_counts(&self, timestamp: i64, report: &PodReadCount) {
        let _guard = self.write_lock.lock();
        let items = self.history.items();

        if let Some(tc) = items.iter().find(|tc| tc.timestamp() == timestamp) {
            tc.update(report);
            return;
        }

        let tc = TimestampedCounts::new(timestamp);
        tc.update(report);

        match items.len() {
            0 => {}
            1 => {
                items[0].close_window(None);
            }
            n => {
                items[n - 1].close_window(Some(&items[n - 2]));
            }
        }
        self.history.append(Arc::new(tc));
    }

    /// Records a pod report at the current aligned wall clock.
    #[inline]
    pub fn record_counts_now(&self, report: &PodReadCount) {
        self.record_counts(now_aligned(self.bucket_width), report)
    }

    /// Rate of `partition` in messages per second over the last `lookback_secs`.
    #[inline]
    pub fn calculate_rate(&self, lookback_secs: i64, partition: &str) -> f64 {
        self.calculate_rate_at(now_aligned(self.bucket_width), lookback_secs, partition)
    }

    /// Rate over the engine's default lookback.
    #[inline]
    pub fn default_rate(&self, partition: &str) -> f64 {
        self.calculate_rate(self.lookback.as_secs() as i64, partition)
    }

    /// Same as [`RateEngine::calculate_rate`] with an explicit aligned `now`.
    pub fn calculate_rate_at(&self, now: i64, lookback_secs: i64, partition: &str) -> f64 {
        let counts = self.history.items();
        if counts.len() <= 1 {
            info!(self.logger, "history too short, rate 0"; "partition" => partition);
            return 0.0;
        }

        let start = find_start_index(now, lookback_secs, &counts);
        let end = find_end_index(&counts);
        let (start, end) = match (start, end) {
            (Some(start), Some(end)) => (start, end),
            (start, end) => {
                if start.is_none() {
                    info!(self.logger, "start index not found, rate 0"; "partition" => partition);
                }
                if end.is_none() {
                    info!(self.logger, "end index not found, rate 0"; "partition" => partition);
                }
                return 0.0;
            }
        };

        let time_diff = counts[end].timestamp() - counts[start].timestamp();
        if time_diff <= 0 {
            info!(self.logger, "time diff is 0, rate 0"; "partition" => partition);
            return 0.0;
        }

        let delta: u64 = counts[start + 1..=end]
            .iter()
            .filter(|tc| tc.is_window_closed())
            .map(|tc| tc.partition_delta(partition))
            .sum();
        if delta == 0 {
            info!(self.logger, "delta is 0, rate 0"; "partition" => partition);
        }
        delta as f64 / time_diff as f64
    }
}

/// Earliest closed bucket still inside the lookback, walking back from the
/// second-to-last one. `None` if that bucket is already out of the window.
fn find_start_index(
    now: i64,
    lookback_secs: i64,
    counts: &[Arc<TimestampedCounts>],
) -> Option<usize> {
    let n = counts.len();
    if n < 2 || now - counts[n - 2].timestamp() > lookback_secs {
        return None;
    }

    let mut start = n - 2;
    for i in (0..=n - 2).rev() {
        if now - counts[i].timestamp() <= lookback_secs && counts[i].is_window_closed() {
            start = i;
        } else {
            break;
        }
    }
    Some(start)
}

/// Most recent closed bucket.
fn find_end_index(counts: &[Arc<TimestampedCounts>]) -> Option<usize> {
    counts.iter().rposition(|tc| tc.is_window_closed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    fn engine(capacity: usize) -> RateEngine {
        let cfg = Config {
            capacity,
            ..Default::default()
        };
        RateEngine::new("v", cfg, &logger())
    }

    fn report(pod: &str, partition: &str, count: u64) -> PodReadCount {
        PodReadCount::new(pod).with_count(partition, count)
    }

    #[test]
    fn align_truncates_to_width() {
        let w = Duration::from_secs(10);
        assert_eq!(align(125, w), 120);
        assert_eq!(align(120, w), 120);
        assert_eq!(align(-5, w), -10);
        assert_eq!(align(7, Duration::ZERO), 7);
    }

    #[test]
    fn empty_or_single_bucket_rate_is_zero() {
        let e = engine(100);
        assert_eq!(e.calculate_rate_at(100, 60, "p1"), 0.0);
        e.record_counts(100, &report("pod-0", "p1", 5));
        assert_eq!(e.calculate_rate_at(100, 60, "p1"), 0.0);
        e.record_counts(100, &report("pod-0", "p1", 50));
        assert_eq!(e.history().len(), 1);
        assert_eq!(e.calculate_rate_at(100, 60, "p1"), 0.0);
    }

    #[test]
    fn same_timestamp_updates_without_closing() {
        let e = engine(100);
        e.record_counts(100, &report("pod-0", "p1", 5));
        e.record_counts(100, &report("pod-1", "p1", 7));
        let history = e.history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_window_closed());
        assert_eq!(history[0].partition_count("p1"), 12);
    }

    #[test]
    fn new_bucket_closes_previous_one() {
        let e = engine(100);
        e.record_counts(100, &report("pod-0", "p1", 5));
        e.record_counts(110, &report("pod-0", "p1", 15));
        let history = e.history();
        assert!(history[0].is_window_closed());
        assert!(!history[1].is_window_closed());
        assert_eq!(history[0].partition_delta("p1"), 5);

        e.record_counts(120, &report("pod-0", "p1", 30));
        let history = e.history();
        assert!(history[1].is_window_closed());
        assert_eq!(history[1].partition_delta("p1"), 10);
        assert!(!history[2].is_window_closed());
    }

    #[test]
    fn end_to_end_rate() {
        let e = engine(100);
        e.record_counts(100, &report("pod-0", "p1", 5));
        e.record_counts(110, &report("pod-0", "p1", 15));
        e.record_counts(120, &report("pod-0", "p1", 30));
        assert_eq!(e.calculate_rate_at(120, 20, "p1"), 1.0);
        assert_eq!(e.calculate_rate_at(120, 20, "p2"), 0.0);
    }

    #[test]
    fn rate_spans_closed_deltas() {
        let e = engine(100);
        for (i, c) in [0u64, 10, 30, 60, 100].iter().enumerate() {
            e.record_counts(100 + 10 * i as i64, &report("pod-0", "p1", *c));
        }
        // closed: 100, 110, 120, 130; open: 140
        assert_eq!(e.calculate_rate_at(140, 40, "p1"), (60 - 0) as f64 / 30.0);
        // start moves up to 120 with a shorter lookback
        assert_eq!(e.calculate_rate_at(140, 20, "p1"), (60 - 30) as f64 / 10.0);
    }

    #[test]
    fn stale_history_rate_is_zero() {
        let e = engine(100);
        e.record_counts(100, &report("pod-0", "p1", 5));
        e.record_counts(110, &report("pod-0", "p1", 15));
        e.record_counts(120, &report("pod-0", "p1", 30));
        // second-to-last bucket (110) is 90s old
        assert_eq!(e.calculate_rate_at(200, 60, "p1"), 0.0);
    }

    #[test]
    fn single_closed_bucket_in_window_is_zero() {
        let e = engine(100);
        e.record_counts(100, &report("pod-0", "p1", 5));
        e.record_counts(110, &report("pod-0", "p1", 15));
        // start and end are both bucket 100
        assert_eq!(e.calculate_rate_at(110, 60, "p1"), 0.0);
    }

    #[test]
    fn pod_restart_never_goes_negative() {
        let e = engine(100);
        e.record_counts(100, &report("pod-0", "p1", 100));
        e.record_counts(110, &report("pod-0", "p1", 200));
        e.record_counts(120, &report("pod-0", "p1", 20));
        e.record_counts(130, &report("pod-0", "p1", 40));
        let history = e.history();
        assert_eq!(history[2].partition_delta("p1"), 20);
        assert_eq!(e.calculate_rate_at(130, 30, "p1"), (100 + 20) as f64 / 20.0);
    }

    #[test]
    fn eviction_keeps_rate_on_recent_buckets() {
        let e = engine(3);
        for i in 0..10i64 {
            e.record_counts(100 + 10 * i, &report("pod-0", "p1", (i * 10) as u64));
        }
        let ts: Vec<i64> = e.history().iter().map(|tc| tc.timestamp()).collect();
        assert_eq!(ts, vec![170, 180, 190]);
        assert_eq!(e.calculate_rate_at(190, 60, "p1"), 1.0);
    }

    #[test]
    fn multiple_pods_and_partitions() {
        let e = engine(100);
        for (t, a, b) in [(100, 0u64, 0u64), (110, 10, 20), (120, 20, 40), (130, 30, 60)] {
            e.record_counts(
                t,
                &PodReadCount::new("pod-0").with_count("p1", a).with_count("p2", b),
            );
            e.record_counts(t, &PodReadCount::new("pod-1").with_count("p1", a));
        }
        assert_eq!(e.calculate_rate_at(130, 30, "p1"), 2.0);
        assert_eq!(e.calculate_rate_at(130, 30, "p2"), 2.0);
    }
}
