use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};

use crate::error::Result;
use crate::isbsvc::IsbService;
use crate::message::{PodReadCount, VertexMetrics};
use crate::pod_tracker::PodTracker;
use crate::rate::{align, now_aligned, RateEngine};
use crate::Config;

type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

pub const DEFAULT_LOOKBACK_LABEL: &str = "default";

/// Source of the cumulative read counts of a pod.
#[async_trait]
pub trait ReadCountFetcher: Send + Sync {
    /// Returns `Ok(None)` when the pod has nothing to report yet.
    async fn fetch(&self, vertex: &str, pod: &str) -> Result<Option<PodReadCount>>;
}

/// Collects pod read counts on a fixed cadence and serves per-partition rates.
///
/// One [`RateEngine`] is kept per watched vertex; partitions are tracked inside
/// the engine's buckets.
pub struct Rater {
    engines: DashMap<String, Arc<RateEngine>>,
    tracker: PodTracker,
    fetcher: Arc<dyn ReadCountFetcher>,
    logger: slog::Logger,
    cfg: Arc<Config>,
}

impl Rater {
    pub fn new(
        pipeline: &str,
        fetcher: Arc<dyn ReadCountFetcher>,
        logger: slog::Logger,
        cfg: Config,
    ) -> Self {
        Self {
            engines: DashMap::default(),
            tracker: PodTracker::new(pipeline),
            fetcher,
            logger,
            cfg: Arc::new(cfg),
        }
    }

    #[inline]
    pub fn pod_tracker(&self) -> &PodTracker {
        &self.tracker
    }

    /// Starts (or rescales) collection for `vertex` with `replicas` pods.
    pub fn watch_vertex(&self, vertex: &str, replicas: usize) {
        self.tracker.set_replicas(vertex, replicas);
        self.engines.entry(vertex.to_owned()).or_insert_with(|| {
            Arc::new(RateEngine::new(
                vertex,
                self.cfg.as_ref().clone(),
                &self.logger,
            ))
        });
    }

    /// Stops collection for `vertex` and drops its history.
    pub fn unwatch_vertex(&self, vertex: &str) {
        self.tracker.remove_vertex(vertex);
        self.engines.remove(vertex);
    }

    #[inline]
    pub fn engine(&self, vertex: &str) -> Option<Arc<RateEngine>> {
        self.engines.get(vertex).map(|e| e.value().clone())
    }

    /// Fetches every active pod once and records the reports at `now`, aligned to
    /// the bucket width. Returns the number of reports recorded.
    pub async fn monitor_once(&self, now: i64) -> usize {
        let ts = align(now, self.cfg.bucket_width);
        let targets = self
            .tracker
            .vertices()
            .into_iter()
            .flat_map(|vertex| {
                let pods = self.tracker.active_pods(&vertex);
                pods.into_iter().map(move |pod| (vertex.clone(), pod))
            })
            .collect::<Vec<_>>();

        let fetch_timeout = self.cfg.fetch_timeout;
        let mut results = stream::iter(targets)
            .map(|(vertex, pod)| async move {
                let res = timeout(fetch_timeout, self.fetcher.fetch(&vertex, &pod)).await;
                (vertex, pod, res)
            })
            .buffer_unordered(self.cfg.fetch_concurrency.max(1));

        let mut recorded = 0;
        while let Some((vertex, pod, res)) = results.next().await {
            match res {
                Ok(Ok(Some(report))) => {
                    if let Some(engine) = self.engine(&vertex) {
                        engine.record_counts(ts, &report);
                        recorded += 1;
                    }
                }
                Ok(Ok(None)) => {
                    debug!("no read counts from pod {}, vertex: {}", pod, vertex);
                }
                Ok(Err(e)) => {
                    warn!("fetch read counts error, pod: {}, {:?}", pod, e);
                }
                Err(_) => {
                    warn!(
                        "fetch read counts timeout after {:?}, pod: {}",
                        fetch_timeout, pod
                    );
                }
            }
        }
        recorded
    }

    /// Runs [`Rater::monitor_once`] every `fetch_interval` until `shutdown` turns `true`.
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "rater started, interval: {:?}, lookback: {:?}",
            self.cfg.fetch_interval, self.cfg.lookback
        );
        let mut ticker = tokio::time::interval(self.cfg.fetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let recorded = self.monitor_once(chrono::Utc::now().timestamp()).await;
                    debug!("recorded {} read count reports", recorded);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("rater stopped");
    }

    /// Rates of `partition` for every configured lookback plus the default one.
    #[inline]
    pub fn get_rates(&self, vertex: &str, partition: &str) -> HashMap<String, f64> {
        self.get_rates_at(now_aligned(self.cfg.bucket_width), vertex, partition)
    }

    pub fn get_rates_at(&self, now: i64, vertex: &str, partition: &str) -> HashMap<String, f64> {
        let engine = self.engine(vertex);
        if engine.is_none() {
            debug!("vertex {} is not watched, rates 0", vertex);
        }
        let rate = |lookback: std::time::Duration| {
            engine
                .as_ref()
                .map(|e| e.calculate_rate_at(now, lookback.as_secs() as i64, partition))
                .unwrap_or(0.0)
        };

        let mut rates = self
            .cfg
            .lookback_windows
            .iter()
            .map(|(label, lookback)| (label.clone(), rate(*lookback)))
            .collect::<HashMap<_, _>>();
        rates.insert(DEFAULT_LOOKBACK_LABEL.to_owned(), rate(self.cfg.lookback));
        rates
    }

    /// Rates of `partition` together with the pending count of `buffer`.
    pub async fn vertex_metrics(
        &self,
        isb: &dyn IsbService,
        vertex: &str,
        partition: &str,
        buffer: &str,
    ) -> Result<VertexMetrics> {
        let info = isb.get_partition_info(buffer).await?;
        Ok(VertexMetrics {
            vertex: vertex.to_owned(),
            partition: partition.to_owned(),
            processing_rates: self.get_rates(vertex, partition),
            pending: info.pending_count,
        })
    }
}
