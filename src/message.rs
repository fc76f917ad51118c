use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The cumulative read counts a single pod reported, keyed by partition.
///
/// Counts are totals since the pod started, not deltas.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PodReadCount {
    pub name: String,
    pub partition_read_counts: HashMap<String, u64>,
}

impl PodReadCount {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_read_counts: HashMap::new(),
        }
    }

    #[inline]
    pub fn with_count(mut self, partition: impl Into<String>, count: u64) -> Self {
        self.partition_read_counts.insert(partition.into(), count);
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.partition_read_counts.is_empty()
    }
}

/// Point-in-time metrics of one vertex partition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VertexMetrics {
    pub vertex: String,
    pub partition: String,
    /// Rate per lookback label, e.g. `1m`, `5m`, `15m`, `default`.
    pub processing_rates: HashMap<String, f64>,
    /// Pending messages of the buffer partition the vertex reads from.
    pub pending: i64,
}
