use std::collections::HashMap;

use parking_lot::RwLock;

use crate::message::PodReadCount;

/// Read counts collected for one aligned time bucket.
///
/// While the window is open, pods keep overwriting their cumulative counts. Closing
/// the window freezes a per-partition delta against the previous bucket; a closed
/// window is never reopened and its delta never recomputed.
#[derive(Debug)]
pub struct TimestampedCounts {
    timestamp: i64,
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    // partition -> pod -> cumulative count
    counts: HashMap<String, HashMap<String, u64>>,
    // partition -> increase over the previous bucket, set on close
    deltas: HashMap<String, u64>,
    window_closed: bool,
}

impl TimestampedCounts {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            inner: RwLock::new(Inner::default()),
        }
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Merges a pod report. The latest cumulative count wins per pod and partition.
    pub fn update(&self, report: &PodReadCount) {
        if report.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        for (partition, count) in &report.partition_read_counts {
            inner
                .counts
                .entry(partition.clone())
                .or_default()
                .insert(report.name.clone(), *count);
        }
    }

    /// Closes the window, using `prev` as the baseline, or zero when `prev` is `None`.
    ///
    /// A pod whose count went backwards (restarted) is measured from zero instead of
    /// from its previous value, so a delta is never negative. Returns `false` if the
    /// window was already closed, in which case nothing changes.
    pub fn close_window(&self, prev: Option<&TimestampedCounts>) -> bool {
        let baseline = prev.map(|p| p.inner.read().counts.clone()).unwrap_or_default();

        let mut inner = self.inner.write();
        if inner.window_closed {
            return false;
        }

        let mut deltas = HashMap::with_capacity(inner.counts.len());
        for (partition, pods) in &inner.counts {
            let prev_pods = baseline.get(partition);
            let delta: u64 = pods
                .iter()
                .map(|(pod, &cur)| {
                    let prev = prev_pods.and_then(|p| p.get(pod)).copied().unwrap_or(0);
                    if cur >= prev {
                        cur - prev
                    } else {
                        cur
                    }
                })
                .sum();
            deltas.insert(partition.clone(), delta);
        }
        inner.deltas = deltas;
        inner.window_closed = true;
        true
    }

    #[inline]
    pub fn is_window_closed(&self) -> bool {
        self.inner.read().window_closed
    }

    /// Per-partition deltas frozen when the window closed.
    ///
    /// Must only be called on a closed window; release builds get an empty map.
    pub fn pod_delta_count_snapshot(&self) -> HashMap<String, u64> {
        let inner = self.inner.read();
        debug_assert!(
            inner.window_closed,
            "delta snapshot read from open window at {}",
            self.timestamp
        );
        if !inner.window_closed {
            return HashMap::new();
        }
        inner.deltas.clone()
    }

    /// Frozen delta of a single partition, `0` while open or if the partition is absent.
    #[inline]
    pub fn partition_delta(&self, partition: &str) -> u64 {
        let inner = self.inner.read();
        if !inner.window_closed {
            return 0;
        }
        inner.deltas.get(partition).copied().unwrap_or(0)
    }

    /// Sum of the latest cumulative counts of all pods for `partition`.
    #[inline]
    pub fn partition_count(&self, partition: &str) -> u64 {
        self.inner
            .read()
            .counts
            .get(partition)
            .map(|pods| pods.values().sum())
            .unwrap_or(0)
    }
}
