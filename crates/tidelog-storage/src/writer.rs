//! File Writer
//!
//! [`FileProducer`] turns a batch of [`ProducerRecord`]s into one new
//! partition file per touched partition.
//!
//! ## Write Flow
//!
//! ```text
//! produce(batch)
//!     ↓
//! list partition files      ← high watermark per partition, once per batch
//!     ↓
//! resolve partition         ← explicit > hash(key) > round-robin
//!     ↓
//! assign offsets            ← contiguous from the high watermark
//!     ↓
//! re-list + conflict check  ← fail if another writer got there first
//!     ↓
//! write partition files     ← one per partition, named by offset/ts range
//! ```
//!
//! A single logical writer per partition is assumed. The conflict check
//! narrows but does not close the race between two writers.

use crate::layout::{LogLayout, PartitionFile};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tidelog_core::{
    partition_for_key, Error, LogProducer, ProducerRecord, Record, RecordPosition, Result,
    Timestamp,
};

pub struct FileProducer {
    layout: LogLayout,
    topic: String,
    round_robin_counter: u32,
}

impl FileProducer {
    pub fn new(layout: LogLayout, topic: impl Into<String>) -> Self {
        Self {
            layout,
            topic: topic.into(),
            round_robin_counter: 0,
        }
    }

    /// Select partition: explicit, then key hash, then round-robin.
    fn select_partition(&mut self, record: &ProducerRecord, partition_count: u32) -> Result<u32> {
        match (record.partition, &record.key) {
            (Some(partition), _) if partition < partition_count => Ok(partition),
            (Some(partition), _) => Err(Error::Configuration(format!(
                "partition {partition} out of range for topic '{}' with {partition_count} partitions",
                self.topic
            ))),
            (None, Some(key)) => Ok(partition_for_key(key, partition_count)),
            (None, None) => {
                let partition = self.round_robin_counter % partition_count;
                self.round_robin_counter = self.round_robin_counter.wrapping_add(1);
                Ok(partition)
            }
        }
    }

    async fn check_conflicts(&self, starts: &BTreeMap<u32, u64>) -> Result<()> {
        for file in self.layout.partition_files(&self.topic).await? {
            if let Some(&start) = starts.get(&file.partition) {
                if file.end_offset >= start {
                    return Err(Error::OffsetConflict {
                        topic: self.topic.clone(),
                        partition: file.partition,
                        offset: start,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LogProducer for FileProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn produce(&mut self, records: Vec<ProducerRecord>) -> Result<Vec<RecordPosition>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let partition_count = self.layout.partition_count(&self.topic).await?.max(1);
        let files = self.layout.partition_files(&self.topic).await?;
        let watermarks = crate::layout::watermarks_from_files(partition_count, &files);
        let starts: BTreeMap<u32, u64> = watermarks.iter().map(|(p, wm)| (*p, wm.high)).collect();
        let mut next_offsets = starts.clone();

        let mut positions = Vec::with_capacity(records.len());
        let mut by_partition: BTreeMap<u32, Vec<Record>> = BTreeMap::new();

        for record in records {
            let partition = self.select_partition(&record, partition_count)?;
            let next = next_offsets.entry(partition).or_insert(0);
            let offset = *next;
            *next += 1;

            let timestamp = record
                .timestamp
                .map(Timestamp::create_time)
                .unwrap_or_else(Timestamp::now);

            positions.push(RecordPosition {
                topic: self.topic.clone(),
                partition,
                offset,
                timestamp,
            });
            by_partition.entry(partition).or_default().push(Record {
                topic: self.topic.clone(),
                partition,
                offset,
                timestamp,
                key: record.key,
                value: record.value,
                headers: record.headers,
            });
        }

        let touched: BTreeMap<u32, u64> = by_partition
            .keys()
            .map(|p| (*p, starts.get(p).copied().unwrap_or(0)))
            .collect();
        self.check_conflicts(&touched).await?;

        for (partition, batch) in &by_partition {
            let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
                continue;
            };
            let file = PartitionFile {
                partition: *partition,
                start_offset: first.offset,
                end_offset: last.offset,
                start_ts: batch.iter().map(|r| r.timestamp.millis).min().unwrap_or(0),
                end_ts: batch.iter().map(|r| r.timestamp.millis).max().unwrap_or(0),
            };
            self.layout.write_file(&self.topic, &file, batch).await?;

            tracing::debug!(
                topic = %self.topic,
                partition = *partition,
                start_offset = file.start_offset,
                end_offset = file.end_offset,
                records = batch.len(),
                "Wrote partition file"
            );
        }

        Ok(positions)
    }
}
