use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;
type DashSet<K> = dashmap::DashSet<K, ahash::RandomState>;

/// Options applied when creating partitions and buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Configuration of the partitions and buckets to be created.
    pub config: String,
}

/// State of one buffer partition.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    pub pending_count: i64,
    pub ack_pending_count: i64,
    pub total_messages: i64,
}

/// Operations on the inter-step buffer service backing a pipeline.
///
/// # Methods
/// - `create_partitions_and_buckets`: Create buffer partitions and their buckets.
/// - `delete_partitions_and_buckets`: Delete buffer partitions and their buckets.
/// - `validate_partitions_and_buckets`: Check that partitions and buckets exist.
/// - `get_partition_info`: Read the pending/ack-pending/total counts of a partition.
#[async_trait]
pub trait IsbService: Send + Sync {
    async fn create_partitions_and_buckets(
        &self,
        partitions: &[String],
        buckets: &[String],
        opts: CreateOptions,
    ) -> Result<()>;
    async fn delete_partitions_and_buckets(
        &self,
        partitions: &[String],
        buckets: &[String],
    ) -> Result<()>;
    async fn validate_partitions_and_buckets(
        &self,
        partitions: &[String],
        buckets: &[String],
    ) -> Result<()>;
    async fn get_partition_info(&self, partition: &str) -> Result<PartitionInfo>;
}

/// An in-memory `IsbService`.
///
/// Creating an existing partition or bucket leaves it untouched. Counts start at zero
/// and are seeded with [`MemIsbService::set_partition_info`].
#[derive(Default)]
pub struct MemIsbService {
    partitions: DashMap<String, PartitionInfo>,
    buckets: DashSet<String>,
}

impl MemIsbService {
    #[inline]
    pub fn create() -> Self {
        Self::default()
    }

    /// Replaces the counts of an existing partition.
    pub fn set_partition_info(&self, info: PartitionInfo) -> Result<()> {
        match self.partitions.get_mut(&info.name) {
            Some(mut p) => {
                *p = info;
                Ok(())
            }
            None => Err(Error::NotFound(format!("partition {}", info.name))),
        }
    }
}

#[async_trait]
impl IsbService for MemIsbService {
    async fn create_partitions_and_buckets(
        &self,
        partitions: &[String],
        buckets: &[String],
        opts: CreateOptions,
    ) -> Result<()> {
        log::debug!(
            "creating partitions {:?}, buckets {:?}, config: {:?}",
            partitions,
            buckets,
            opts.config
        );
        for p in partitions {
            self.partitions
                .entry(p.clone())
                .or_insert_with(|| PartitionInfo {
                    name: p.clone(),
                    ..Default::default()
                });
        }
        for b in buckets {
            self.buckets.insert(b.clone());
        }
        Ok(())
    }

    async fn delete_partitions_and_buckets(
        &self,
        partitions: &[String],
        buckets: &[String],
    ) -> Result<()> {
        for p in partitions {
            self.partitions.remove(p);
        }
        for b in buckets {
            self.buckets.remove(b);
        }
        Ok(())
    }

    async fn validate_partitions_and_buckets(
        &self,
        partitions: &[String],
        buckets: &[String],
    ) -> Result<()> {
        if let Some(p) = partitions.iter().find(|p| !self.partitions.contains_key(*p)) {
            return Err(Error::NotFound(format!("partition {}", p)));
        }
        if let Some(b) = buckets.iter().find(|b| !self.buckets.contains(*b)) {
            return Err(Error::NotFound(format!("bucket {}", b)));
        }
        Ok(())
    }

    async fn get_partition_info(&self, partition: &str) -> Result<PartitionInfo> {
        self.partitions
            .get(partition)
            .map(|p| p.value().clone())
            .ok_or_else(|| Error::NotFound(format!("partition {}", partition)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn create_validate_delete() {
        let isb = MemIsbService::create();
        let partitions = names(&["pl-in-0", "pl-in-1"]);
        let buckets = names(&["pl-in-ot"]);

        assert!(matches!(
            isb.validate_partitions_and_buckets(&partitions, &buckets).await,
            Err(Error::NotFound(_))
        ));

        isb.create_partitions_and_buckets(&partitions, &buckets, CreateOptions::default())
            .await
            .unwrap();
        isb.validate_partitions_and_buckets(&partitions, &buckets)
            .await
            .unwrap();

        isb.delete_partitions_and_buckets(&[], &buckets).await.unwrap();
        assert!(matches!(
            isb.validate_partitions_and_buckets(&partitions, &buckets).await,
            Err(Error::NotFound(msg)) if msg == "bucket pl-in-ot"
        ));
    }

    #[tokio::test]
    async fn partition_info_roundtrip() {
        let isb = MemIsbService::create();
        let partitions = names(&["pl-in-0"]);
        isb.create_partitions_and_buckets(&partitions, &[], CreateOptions::default())
            .await
            .unwrap();
        assert_eq!(isb.get_partition_info("pl-in-0").await.unwrap().pending_count, 0);

        isb.set_partition_info(PartitionInfo {
            name: "pl-in-0".into(),
            pending_count: 42,
            ack_pending_count: 2,
            total_messages: 44,
        })
        .unwrap();

        // creating again keeps the existing counts
        isb.create_partitions_and_buckets(&partitions, &[], CreateOptions::default())
            .await
            .unwrap();
        let info = isb.get_partition_info("pl-in-0").await.unwrap();
        assert_eq!(info.pending_count, 42);
        assert_eq!(info.total_messages, 44);

        assert!(isb.get_partition_info("missing").await.is_err());
        assert!(isb
            .set_partition_info(PartitionInfo {
                name: "missing".into(),
                ..Default::default()
            })
            .is_err());
    }
}
