use log::debug;

type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

/// Keeps the set of pods the rater collects read counts from, per vertex.
///
/// Pods are named `{pipeline}-{vertex}-{index}`, matching how vertex replicas are
/// numbered.
pub struct PodTracker {
    pipeline: String,
    // vertex -> pod names, ordered by replica index
    pods: DashMap<String, Vec<String>>,
}

impl PodTracker {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            pods: DashMap::default(),
        }
    }

    #[inline]
    pub fn pod_name(&self, vertex: &str, index: usize) -> String {
        format!("{}-{}-{}", self.pipeline, vertex, index)
    }

    /// Scales the tracked pods of `vertex` to `replicas`.
    pub fn set_replicas(&self, vertex: &str, replicas: usize) {
        let pods = (0..replicas)
            .map(|i| self.pod_name(vertex, i))
            .collect::<Vec<_>>();
        let prev = self.pods.insert(vertex.to_owned(), pods).map(|p| p.len());
        if prev != Some(replicas) {
            debug!(
                "vertex {} replicas changed, {:?} -> {}",
                vertex, prev, replicas
            );
        }
    }

    #[inline]
    pub fn remove_vertex(&self, vertex: &str) {
        self.pods.remove(vertex);
    }

    #[inline]
    pub fn vertices(&self) -> Vec<String> {
        self.pods.iter().map(|e| e.key().clone()).collect()
    }

    #[inline]
    pub fn active_pods(&self, vertex: &str) -> Vec<String> {
        self.pods
            .get(vertex)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    #[inline]
    pub fn is_active(&self, vertex: &str, pod: &str) -> bool {
        self.pods
            .get(vertex)
            .map(|p| p.iter().any(|name| name == pod))
            .unwrap_or(false)
    }

    /// Total number of tracked pods across all vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.pods.iter().map(|e| e.value().len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
