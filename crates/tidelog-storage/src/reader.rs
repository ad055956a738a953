//! File Reader
//!
//! [`FileConsumer`] reads one topic on behalf of a consumer group.
//!
//! ## Positioning
//!
//! On open, each partition's start offset is resolved with the precedence:
//!
//! 1. explicit offset from the [`ConsumerSpec`] (negative = relative to the
//!    high watermark, `-1` is the last record)
//! 2. the group's committed offset
//! 3. `auto_offset_reset`: `earliest` → low watermark, `latest` → high watermark
//!
//! If the group had no entry for the topic, the resolved positions are
//! persisted right away so a second reader in the same group starts from
//! the same place.
//!
//! ## Read Flow
//!
//! ```text
//! consume(n)
//!     ↓
//! list partition files ending at or after each position
//!     ↓
//! interleave files round-robin by partition
//!     ↓
//! scan records in order, skipping offsets below the position
//!     ↓
//! stop a partition past its end offset, stop everything at n
//!     ↓
//! auto-commit (if enabled and something was read)
//! ```

use crate::groups::GroupStore;
use crate::layout::{LogLayout, PartitionFile};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tidelog_core::{
    validate_name, ConsumerGroupState, ConsumerSpec, Error, GroupLifecycle, LogConfig,
    LogConsumer, OffsetReset, Record, Result, Watermark,
};

pub struct FileConsumer {
    layout: LogLayout,
    groups: GroupStore,
    topic: String,
    group: String,
    positions: BTreeMap<u32, u64>,
    end_offsets: Option<BTreeMap<u32, u64>>,
    auto_commit: bool,
    closed: bool,
}

/// Start offset for one partition from an explicit (possibly negative) value.
fn explicit_offset(value: i64, watermark: Watermark) -> u64 {
    if value >= 0 {
        value as u64
    } else {
        let back = value.unsigned_abs();
        watermark.high.saturating_sub(back)
    }
}

impl FileConsumer {
    /// Resolve start positions and bind to the consumer group.
    ///
    /// # Errors
    ///
    /// - `Unsupported` when more than one topic is requested
    /// - `NotFound` when the topic does not exist
    /// - `InvalidName` for an illegal topic or group name
    pub async fn open(
        layout: LogLayout,
        groups: GroupStore,
        config: &LogConfig,
        spec: ConsumerSpec,
    ) -> Result<Self> {
        let topic = match spec.topics.as_slice() {
            [topic] => topic.clone(),
            [] => return Err(Error::Configuration("no topic to consume".into())),
            topics => {
                return Err(Error::Unsupported(format!(
                    "reading {} topics at once; open one consumer per topic",
                    topics.len()
                )))
            }
        };
        validate_name(&topic)?;

        let group = spec.group.unwrap_or_else(|| {
            format!("{}{}", config.consumer_group_prefix, uuid::Uuid::new_v4())
        });
        validate_name(&group)?;

        let watermarks = layout.watermarks(&topic).await?;
        let mut state = groups.get(&group).await?.unwrap_or_default();
        let committed = state.offsets.get(&topic).cloned();
        let explicit = spec.offsets.unwrap_or_default();

        let positions: BTreeMap<u32, u64> = watermarks
            .iter()
            .map(|(&partition, &wm)| {
                let start = match (explicit.get(&partition), committed.as_ref()) {
                    (Some(&value), _) => explicit_offset(value, wm),
                    (None, Some(offsets)) if offsets.contains_key(&partition) => {
                        offsets[&partition]
                    }
                    _ => match config.auto_offset_reset {
                        OffsetReset::Earliest => wm.low,
                        OffsetReset::Latest => wm.high,
                    },
                };
                (partition, start)
            })
            .collect();

        if committed.is_none() || state.state == GroupLifecycle::Empty {
            if committed.is_none() {
                state.offsets.insert(topic.clone(), positions.clone());
            }
            state.state = GroupLifecycle::Stable;
            groups.set(&group, &state).await?;
        }

        tracing::debug!(
            topic = %topic,
            group = %group,
            positions = ?positions,
            "Opened consumer"
        );

        Ok(Self {
            layout,
            groups,
            topic,
            group,
            positions,
            end_offsets: spec.end_offsets,
            auto_commit: spec.auto_commit.unwrap_or(config.enable_auto_commit),
            closed: false,
        })
    }

    fn end_offset(&self, partition: u32) -> Option<u64> {
        self.end_offsets
            .as_ref()
            .and_then(|ends| ends.get(&partition).copied())
    }

    /// Files that may hold unread records, grouped by partition.
    async fn candidate_files(&self) -> Result<BTreeMap<u32, Vec<PartitionFile>>> {
        let mut candidates: BTreeMap<u32, Vec<PartitionFile>> = BTreeMap::new();
        for file in self.layout.partition_files(&self.topic).await? {
            let Some(&position) = self.positions.get(&file.partition) else {
                continue;
            };
            if file.end_offset < position {
                continue;
            }
            if self
                .end_offset(file.partition)
                .is_some_and(|end| file.start_offset > end || position > end)
            {
                continue;
            }
            candidates.entry(file.partition).or_default().push(file);
        }
        Ok(candidates)
    }
}

#[async_trait]
impl LogConsumer for FileConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn positions(&self) -> BTreeMap<u32, u64> {
        self.positions.clone()
    }

    fn seek(&mut self, partition: u32, offset: u64) {
        self.positions.insert(partition, offset);
    }

    async fn consume(&mut self, n: usize) -> Result<Vec<Record>> {
        if self.closed {
            return Err(Error::Unsupported(format!(
                "consume on closed consumer of group '{}'",
                self.group
            )));
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.candidate_files().await?;
        let rounds = candidates.values().map(Vec::len).max().unwrap_or(0);
        let mut batch = Vec::new();

        'rounds: for round in 0..rounds {
            for (partition, files) in &candidates {
                let Some(file) = files.get(round) else {
                    continue;
                };
                let end = self.end_offset(*partition);
                for record in self.layout.read_file(&self.topic, file).await? {
                    let position = self.positions.get(partition).copied().unwrap_or(0);
                    if record.offset < position {
                        continue;
                    }
                    if end.is_some_and(|end| record.offset > end) {
                        break;
                    }
                    self.positions.insert(*partition, record.offset + 1);
                    batch.push(record);
                    if batch.len() >= n {
                        break 'rounds;
                    }
                }
            }
        }

        tracing::debug!(
            topic = %self.topic,
            group = %self.group,
            records = batch.len(),
            "Consumed batch"
        );

        if self.auto_commit && !batch.is_empty() {
            self.commit(None).await?;
        }
        Ok(batch)
    }

    async fn commit(&mut self, offsets: Option<BTreeMap<u32, u64>>) -> Result<()> {
        let offsets = offsets.unwrap_or_else(|| self.positions.clone());
        let mut state = self.groups.get(&self.group).await?.unwrap_or_default();
        state
            .offsets
            .entry(self.topic.clone())
            .or_default()
            .extend(offsets.iter().map(|(p, o)| (*p, *o)));
        state.state = GroupLifecycle::Stable;
        self.groups.set(&self.group, &state).await?;

        tracing::debug!(
            group = %self.group,
            topic = %self.topic,
            offsets = ?offsets,
            "Committed offsets"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut state: ConsumerGroupState =
            self.groups.get(&self.group).await?.unwrap_or_default();
        state.state = GroupLifecycle::Empty;
        self.groups.set(&self.group, &state).await?;
        self.closed = true;

        tracing::debug!(group = %self.group, topic = %self.topic, "Closed consumer");
        Ok(())
    }
}
