//! Backend Contract
//!
//! Every physical backend (file emulation over local disk, object storage,
//! or blob storage; a real broker; a REST gateway) implements the same three
//! roles:
//!
//! - [`LogAdmin`]: topics, partitions, watermarks, consumer groups
//! - [`LogProducer`]: assigns partitions and offsets, writes batches
//! - [`LogConsumer`]: positions itself, reads batches, commits offsets
//!
//! [`LogBackend`] ties them together and is what the chunking and pipeline
//! layers depend on. A backend is chosen once, at construction time.
//!
//! ## Consumer lifecycle
//!
//! ```text
//! open_consumer(spec)  ──►  Positioned  ──consume()──►  Positioned
//!                               │                          │
//!                               └──────── close() ─────────┴──►  Closed
//! ```
//!
//! Positioning resolves each partition's start offset with the precedence
//! explicit offsets > group's committed offset > `auto_offset_reset` policy.

use crate::config::LogConfig;
use crate::error::Result;
use crate::record::{
    ConsumerGroupState, ProducerRecord, Record, RecordPosition, TopicConfig, Watermark,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Topic-level administration.
#[async_trait]
pub trait LogAdmin: Send + Sync {
    /// Create a topic, persisting its partition count and configuration.
    ///
    /// Overwrites existing metadata (used by [`LogAdmin::recreate`]).
    async fn create_topic(&self, topic: &str, partitions: u32, config: TopicConfig)
        -> Result<()>;

    /// Delete every topic whose name matches the glob `pattern`, including
    /// all partition files and metadata. Returns the deleted topic names.
    async fn delete_topics(&self, pattern: &str) -> Result<Vec<String>>;

    /// Topic names matching the glob `pattern`, sorted.
    async fn list_topics(&self, pattern: &str) -> Result<Vec<String>>;

    /// Partition count of every topic matching `pattern`.
    async fn partitions(&self, pattern: &str) -> Result<BTreeMap<String, u32>>;

    /// Persisted configuration of a topic (empty when none was given).
    async fn topic_config(&self, topic: &str) -> Result<TopicConfig>;

    /// Low/high offset bounds of every partition of `topic`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the topic does not exist.
    async fn watermarks(&self, topic: &str) -> Result<BTreeMap<u32, Watermark>>;

    /// For each partition, the first offset whose timestamp is at or after
    /// the given millis; the high watermark when there is none.
    async fn offsets_for_times(
        &self,
        topic: &str,
        times: &BTreeMap<u32, i64>,
    ) -> Result<BTreeMap<u32, u64>>;

    /// Consumer group names matching `pattern`, sorted.
    async fn list_groups(&self, pattern: &str) -> Result<Vec<String>>;

    /// Persisted state of a group, `None` if the group never committed.
    async fn describe_group(&self, group: &str) -> Result<Option<ConsumerGroupState>>;

    /// Remove a group's persisted state. Idempotent.
    async fn delete_group(&self, group: &str) -> Result<()>;

    async fn exists(&self, topic: &str) -> Result<bool> {
        Ok(self.list_topics(topic).await?.iter().any(|t| t == topic))
    }

    /// Delete and create a topic again with the same partitions and config.
    async fn recreate(&self, topic: &str) -> Result<()> {
        let partitions = self
            .partitions(topic)
            .await?
            .remove(topic)
            .ok_or_else(|| crate::Error::not_found(format!("topic '{topic}'")))?;
        let config = self.topic_config(topic).await?;
        self.delete_topics(topic).await?;
        self.create_topic(topic, partitions, config).await
    }

    /// Retained record count per partition of each topic matching `pattern`.
    async fn size(&self, pattern: &str) -> Result<BTreeMap<String, BTreeMap<u32, u64>>> {
        let mut sizes = BTreeMap::new();
        for topic in self.list_topics(pattern).await? {
            let per_partition = self
                .watermarks(&topic)
                .await?
                .into_iter()
                .map(|(p, wm)| (p, wm.len()))
                .collect();
            sizes.insert(topic, per_partition);
        }
        Ok(sizes)
    }

    /// Records a group has yet to read per partition of `topic`.
    ///
    /// Partitions the group never committed count from the low watermark.
    async fn lags(&self, group: &str, topic: &str) -> Result<BTreeMap<u32, u64>> {
        let watermarks = self.watermarks(topic).await?;
        let state = self.describe_group(group).await?.unwrap_or_default();
        let committed = state.offsets.get(topic);
        Ok(watermarks
            .into_iter()
            .map(|(p, wm)| {
                let position = committed
                    .and_then(|offsets| offsets.get(&p).copied())
                    .unwrap_or(wm.low);
                (p, wm.high.saturating_sub(position))
            })
            .collect())
    }

    /// Groups (matching `pattern`) that have committed offsets for `topic`.
    async fn groups_for_topic(&self, pattern: &str, topic: &str) -> Result<Vec<String>> {
        let mut groups = Vec::new();
        for group in self.list_groups(pattern).await? {
            if let Some(state) = self.describe_group(&group).await? {
                if state.offsets.contains_key(topic) {
                    groups.push(group);
                }
            }
        }
        Ok(groups)
    }
}

/// Writes batches of records to one topic.
#[async_trait]
pub trait LogProducer: Send {
    fn topic(&self) -> &str;

    /// Assign partitions and offsets and persist the batch.
    ///
    /// Within one call the offsets assigned to a partition are contiguous,
    /// starting at that partition's high watermark.
    async fn produce(&mut self, records: Vec<ProducerRecord>) -> Result<Vec<RecordPosition>>;

    /// Flush buffered records, if the backend buffers at all.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// What to read and where to start.
#[derive(Debug, Clone, Default)]
pub struct ConsumerSpec {
    /// Topics to read. Exactly one is supported by the file backends.
    pub topics: Vec<String>,
    /// Consumer group; a fresh `<prefix><uuid>` group when `None`.
    pub group: Option<String>,
    /// Explicit start offsets per partition. Negative values count back from
    /// the high watermark (`-1` is the last record).
    pub offsets: Option<BTreeMap<u32, i64>>,
    /// Inclusive end offsets per partition.
    pub end_offsets: Option<BTreeMap<u32, u64>>,
    /// Overrides the backend's `enable_auto_commit`.
    pub auto_commit: Option<bool>,
}

impl ConsumerSpec {
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topics: vec![topic.into()],
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_offsets(mut self, offsets: BTreeMap<u32, i64>) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn with_end_offsets(mut self, end_offsets: BTreeMap<u32, u64>) -> Self {
        self.end_offsets = Some(end_offsets);
        self
    }

    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = Some(enabled);
        self
    }
}

/// Reads batches of records from one topic on behalf of a consumer group.
#[async_trait]
pub trait LogConsumer: Send {
    fn topic(&self) -> &str;

    fn group(&self) -> &str;

    /// Next offset to read per partition.
    fn positions(&self) -> BTreeMap<u32, u64>;

    /// Partitions this consumer reads.
    fn assignment(&self) -> Vec<u32> {
        self.positions().into_keys().collect()
    }

    /// Move a partition's read position.
    fn seek(&mut self, partition: u32, offset: u64);

    /// Read up to `n` records. An empty batch means nothing is left within
    /// the configured bounds.
    async fn consume(&mut self, n: usize) -> Result<Vec<Record>>;

    /// Persist next-offsets to the group. `None` commits current positions.
    async fn commit(&mut self, offsets: Option<BTreeMap<u32, u64>>) -> Result<()>;

    /// Mark the group empty. Committed offsets stay in place.
    async fn close(&mut self) -> Result<()>;
}

/// A complete backend: admin plus producer and consumer factories.
#[async_trait]
pub trait LogBackend: LogAdmin {
    /// Short backend name for logs ("local", "s3", "azure", "memory", ...).
    fn kind(&self) -> &str;

    fn config(&self) -> &LogConfig;

    /// Whether arbitrary-size byte values can be written, which chunking needs.
    fn supports_chunking(&self) -> bool {
        true
    }

    async fn open_producer(&self, topic: &str) -> Result<Box<dyn LogProducer>>;

    async fn open_consumer(&self, spec: ConsumerSpec) -> Result<Box<dyn LogConsumer>>;
}
