//! Log Layout
//!
//! How topics, partitions and consumer groups map onto a [`ByteStore`]:
//!
//! ```text
//! <root>/
//! ├── topic,orders/
//! │   ├── metadata.json                 {"topic": "orders", "partitions": 3, "config": {...}}
//! │   └── partitions/
//! │       ├── partition,000000000,000000000000000000000,000000000000000000099,<ts>,<ts>
//! │       └── partition,000000000,000000000000000000100,000000000000000000149,<ts>,<ts>
//! └── groups/
//!     └── analytics.json                {"offsets": {"orders": {"0": 150}}, "state": "stable"}
//! ```
//!
//! Partition file names carry the partition, the inclusive offset range and
//! the timestamp range of their contents, so watermarks and file lookup only
//! need a listing. Zero-padding makes lexical and numeric order agree.

use crate::codec::RecordCodec;
use crate::store::{join, ByteStore};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tidelog_core::{glob_match, Error, Record, Result, TopicConfig, Watermark};

pub const TOPIC_DIR_PREFIX: &str = "topic,";
pub const METADATA_FILE: &str = "metadata.json";
pub const PARTITIONS_DIR: &str = "partitions";
pub const GROUPS_DIR: &str = "groups";
pub const PARTITION_FILE_PREFIX: &str = "partition";

/// Directory of a topic, relative to the store root.
pub fn topic_dir(topic: &str) -> String {
    format!("{TOPIC_DIR_PREFIX}{topic}")
}

pub fn metadata_path(topic: &str) -> String {
    join(&topic_dir(topic), METADATA_FILE)
}

pub fn partitions_dir(topic: &str) -> String {
    join(&topic_dir(topic), PARTITIONS_DIR)
}

/// Content of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub topic: String,
    pub partitions: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: TopicConfig,
}

/// Identity of one immutable partition file, parsed from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionFile {
    pub partition: u32,
    pub start_offset: u64,
    /// Inclusive
    pub end_offset: u64,
    pub start_ts: i64,
    pub end_ts: i64,
}

impl PartitionFile {
    /// `partition,<9 digits>,<21 digits>,<21 digits>,<start ts>,<end ts>`
    pub fn file_name(&self) -> String {
        format!(
            "{PARTITION_FILE_PREFIX},{:09},{:021},{:021},{},{}",
            self.partition, self.start_offset, self.end_offset, self.start_ts, self.end_ts
        )
    }

    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split(',');
        if parts.next()? != PARTITION_FILE_PREFIX {
            return None;
        }
        let file = Self {
            partition: parts.next()?.parse().ok()?,
            start_offset: parts.next()?.parse().ok()?,
            end_offset: parts.next()?.parse().ok()?,
            start_ts: parts.next()?.parse().ok()?,
            end_ts: parts.next()?.parse().ok()?,
        };
        if parts.next().is_some() || file.end_offset < file.start_offset {
            return None;
        }
        Some(file)
    }
}

impl fmt::Display for PartitionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Topic-level view of a byte store, shared by the admin, writer and reader.
#[derive(Clone)]
pub struct LogLayout {
    store: Arc<dyn ByteStore>,
    codec: RecordCodec,
}

impl LogLayout {
    pub fn new(store: Arc<dyn ByteStore>, codec: RecordCodec) -> Self {
        Self { store, codec }
    }

    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    pub fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Topic names matching `pattern`, sorted.
    pub async fn topics(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_dirs("")
            .await?
            .into_iter()
            .filter_map(|dir| dir.strip_prefix(TOPIC_DIR_PREFIX).map(str::to_string))
            .filter(|topic| glob_match(pattern, topic))
            .collect())
    }

    pub async fn topic_exists(&self, topic: &str) -> Result<bool> {
        Ok(self.store.exists_file(&metadata_path(topic)).await?
            || !self.partition_files(topic).await?.is_empty())
    }

    pub async fn read_metadata(&self, topic: &str) -> Result<Option<TopicMetadata>> {
        let path = metadata_path(topic);
        match self.store.read_bytes(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::Codec {
                    path,
                    message: e.to_string(),
                }),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write_metadata(&self, metadata: &TopicMetadata) -> Result<()> {
        let bytes = serde_json::to_vec(metadata)?;
        self.store
            .write_bytes(&metadata_path(&metadata.topic), Bytes::from(bytes))
            .await
    }

    /// Partition count from metadata; topics without metadata have one.
    pub async fn partition_count(&self, topic: &str) -> Result<u32> {
        Ok(self
            .read_metadata(topic)
            .await?
            .map(|m| m.partitions)
            .unwrap_or(1))
    }

    /// Every partition file of a topic, ordered by partition then start offset.
    pub async fn partition_files(&self, topic: &str) -> Result<Vec<PartitionFile>> {
        let mut files = Vec::new();
        for name in self.store.list_files(&partitions_dir(topic)).await? {
            match PartitionFile::parse(&name) {
                Some(file) => files.push(file),
                None => {
                    tracing::warn!(topic = %topic, file = %name, "Skipping unrecognized partition file")
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Files of one partition, ordered by start offset.
    pub async fn files_for_partition(&self, topic: &str, partition: u32) -> Result<Vec<PartitionFile>> {
        Ok(self
            .partition_files(topic)
            .await?
            .into_iter()
            .filter(|f| f.partition == partition)
            .collect())
    }

    /// The last file of `partition` whose start offset is at or below `offset`.
    ///
    /// # Errors
    ///
    /// `NotFound` if every file starts after `offset` or there are none.
    pub async fn find_partition_file(
        &self,
        topic: &str,
        partition: u32,
        offset: u64,
    ) -> Result<PartitionFile> {
        self.files_for_partition(topic, partition)
            .await?
            .into_iter()
            .take_while(|f| f.start_offset <= offset)
            .last()
            .ok_or_else(|| {
                Error::not_found(format!(
                    "partition file for {topic}/{partition} at offset {offset}"
                ))
            })
    }

    /// Low/high watermarks of every partition of `topic`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the topic has neither metadata nor partition files.
    pub async fn watermarks(&self, topic: &str) -> Result<BTreeMap<u32, Watermark>> {
        let metadata = self.read_metadata(topic).await?;
        let files = self.partition_files(topic).await?;
        if metadata.is_none() && files.is_empty() {
            return Err(Error::not_found(format!("topic '{topic}'")));
        }

        let count = metadata.map(|m| m.partitions).unwrap_or(1);
        Ok(watermarks_from_files(count, &files))
    }

    pub async fn read_file(&self, topic: &str, file: &PartitionFile) -> Result<Vec<Record>> {
        let path = join(&partitions_dir(topic), &file.file_name());
        let bytes = self.store.read_bytes(&path).await?;
        self.codec.decode_file(&path, &bytes)
    }

    pub async fn write_file(&self, topic: &str, file: &PartitionFile, records: &[Record]) -> Result<()> {
        let path = join(&partitions_dir(topic), &file.file_name());
        let bytes = self.codec.encode_file(records)?;
        self.store.write_bytes(&path, bytes).await
    }
}

/// Watermarks for partitions `0..count` from a listing of partition files.
///
/// low = lowest start offset (or 0), high = highest end offset + 1 (or 0).
pub fn watermarks_from_files(count: u32, files: &[PartitionFile]) -> BTreeMap<u32, Watermark> {
    (0..count)
        .map(|partition| {
            let mut in_partition = files.iter().filter(|f| f.partition == partition);
            let watermark = match in_partition.next() {
                None => Watermark::default(),
                Some(first) => in_partition.fold(
                    Watermark {
                        low: first.start_offset,
                        high: first.end_offset + 1,
                    },
                    |wm, f| Watermark {
                        low: wm.low.min(f.start_offset),
                        high: wm.high.max(f.end_offset + 1),
                    },
                ),
            };
            (partition, watermark)
        })
        .collect()
}
