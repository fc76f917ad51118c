use std::time::Duration;

pub use crate::error::{Error, Result};
pub use crate::isbsvc::{CreateOptions, IsbService, MemIsbService, PartitionInfo};
pub use crate::message::{PodReadCount, VertexMetrics};
pub use crate::pod_tracker::PodTracker;
pub use crate::queue::OverflowQueue;
pub use crate::rate::{align, now_aligned, RateEngine};
pub use crate::rater::{Rater, ReadCountFetcher, DEFAULT_LOOKBACK_LABEL};
pub use crate::timestamped_counts::TimestampedCounts;

mod error;
mod isbsvc;
mod message;
mod pod_tracker;
mod queue;
mod rate;
mod rater;
mod timestamped_counts;

#[derive(Clone, Debug)]
pub struct Config {
    //Buckets of history kept per vertex
    pub capacity: usize,
    //Alignment of bucket timestamps
    pub bucket_width: Duration,
    //Lookback of the default rate
    pub lookback: Duration,
    //Additional labelled lookbacks reported by the rater
    pub lookback_windows: Vec<(String, Duration)>,
    //Read count collection
    pub fetch_interval: Duration,
    pub fetch_timeout: Duration,
    pub fetch_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 1800,
            bucket_width: Duration::from_secs(10),
            lookback: Duration::from_secs(120),
            lookback_windows: vec![
                ("1m".into(), Duration::from_secs(60)),
                ("5m".into(), Duration::from_secs(300)),
                ("15m".into(), Duration::from_secs(900)),
            ],
            fetch_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(1),
            fetch_concurrency: 50,
        }
    }
}
