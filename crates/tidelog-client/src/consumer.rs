//! Typed consumer.
//!
//! [`Consumer`] pulls raw records from the backend's [`LogConsumer`],
//! reassembles chunked values, and decodes keys and values into
//! [`Message`]s. Decoding failures carry the record's position.

use crate::chunking::Dechunker;
use crate::error::{ClientError, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tidelog_core::{ConsumerSpec, Header, LogBackend, LogConsumer, Record, Timestamp};
use tidelog_schema::{Codec, Payload, TypeTag};

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: Timestamp,
    pub key: Option<Payload>,
    pub value: Option<Payload>,
    pub headers: Vec<Header>,
}

impl Message {
    pub fn header(&self, key: &str) -> Option<&Bytes> {
        self.headers.iter().find(|h| h.key == key).map(|h| &h.value)
    }

    /// Key rendered as text, empty when absent.
    pub fn key_text(&self) -> String {
        self.key.as_ref().map(Payload::to_text).unwrap_or_default()
    }

    /// Value rendered as text, empty when absent.
    pub fn value_text(&self) -> String {
        self.value.as_ref().map(Payload::to_text).unwrap_or_default()
    }
}

/// How a pipeline or caller wants to read a topic.
///
/// Unset fields fall back to the storage configuration; the default reads
/// everything from the `auto_offset_reset` position with a fresh group.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub group: Option<String>,
    /// Explicit start offsets; negative values count back from the end.
    pub offsets: Option<BTreeMap<u32, i64>>,
    /// Inclusive last offsets per partition.
    pub end_offsets: Option<BTreeMap<u32, u64>>,
    /// Stop after this many messages.
    pub n: Option<usize>,
    pub batch_size: Option<usize>,
    pub key_type: Option<TypeTag>,
    pub value_type: Option<TypeTag>,
    pub auto_commit: Option<bool>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
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

    pub fn with_n(mut self, n: usize) -> Self {
        self.n = Some(n);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_types(mut self, key_type: TypeTag, value_type: TypeTag) -> Self {
        self.key_type = Some(key_type);
        self.value_type = Some(value_type);
        self
    }

    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = Some(enabled);
        self
    }
}

pub struct Consumer {
    inner: Box<dyn LogConsumer>,
    codec: Arc<Codec>,
    key_type: TypeTag,
    value_type: TypeTag,
    dechunker: Dechunker,
    batch_size: usize,
    commit_after_processing: bool,
}

impl Consumer {
    /// Open a consumer on `topic`. With `commit_after_processing`, the
    /// backend's auto-commit is turned off and callers commit through
    /// [`Consumer::processed`].
    pub(crate) async fn open(
        backend: &dyn LogBackend,
        codec: Arc<Codec>,
        topic: &str,
        options: &ReadOptions,
        (key_type, value_type): (TypeTag, TypeTag),
        commit_after_processing: bool,
    ) -> Result<Self> {
        let config = backend.config();
        let auto_commit = if commit_after_processing {
            Some(false)
        } else {
            options.auto_commit
        };

        let spec = ConsumerSpec {
            topics: vec![topic.to_string()],
            group: options.group.clone(),
            offsets: options.offsets.clone(),
            end_offsets: options.end_offsets.clone(),
            auto_commit,
        };
        let inner = backend.open_consumer(spec).await?;

        Ok(Self {
            inner,
            codec,
            key_type,
            value_type,
            dechunker: Dechunker::new(value_type.is_framed(), config.chunk_buffer_max_pending),
            batch_size: options.batch_size.unwrap_or(config.consume_batch_size).max(1),
            commit_after_processing,
        })
    }

    pub fn topic(&self) -> &str {
        self.inner.topic()
    }

    pub fn group(&self) -> &str {
        self.inner.group()
    }

    pub fn key_type(&self) -> TypeTag {
        self.key_type
    }

    pub fn value_type(&self) -> TypeTag {
        self.value_type
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn positions(&self) -> BTreeMap<u32, u64> {
        self.inner.positions()
    }

    pub fn assignment(&self) -> Vec<u32> {
        self.inner.assignment()
    }

    pub fn seek(&mut self, partition: u32, offset: u64) {
        self.inner.seek(partition, offset);
    }

    async fn decode(&self, record: Record) -> Result<Message> {
        let (topic, partition, offset) = (record.topic.clone(), record.partition, record.offset);
        let decoded = async {
            let key = match record.key {
                Some(key) => Some(self.codec.decode(self.key_type, key).await?),
                None => None,
            };
            let value = match record.value {
                Some(value) => Some(self.codec.decode(self.value_type, value).await?),
                None => None,
            };
            Ok::<_, ClientError>(Message {
                topic: record.topic,
                partition: record.partition,
                offset: record.offset,
                timestamp: record.timestamp,
                key,
                value,
                headers: record.headers,
            })
        }
        .await;
        decoded.map_err(|e| e.at(topic, partition, offset))
    }

    /// Read up to `n` decoded messages.
    ///
    /// Chunk records that do not complete a message are buffered and not
    /// counted; an empty result means the consumer reached the end of what
    /// it may read.
    pub async fn consume(&mut self, n: usize) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        while messages.is_empty() {
            let records = self.inner.consume(n).await?;
            if records.is_empty() {
                break;
            }
            for record in records {
                if let Some(record) = self.dechunker.push(record)? {
                    messages.push(self.decode(record).await?);
                }
            }
        }
        Ok(messages)
    }

    /// Read one batch of the configured batch size.
    pub async fn consume_batch(&mut self) -> Result<Vec<Message>> {
        self.consume(self.batch_size).await
    }

    /// Commit the current positions, or explicit ones.
    pub async fn commit(&mut self, offsets: Option<BTreeMap<u32, u64>>) -> Result<()> {
        Ok(self.inner.commit(offsets).await?)
    }

    /// Signal that everything consumed so far has been processed. Commits
    /// when the storage is configured to commit after processing.
    pub async fn processed(&mut self) -> Result<()> {
        if self.commit_after_processing {
            self.commit(None).await?;
        }
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        Ok(self.inner.close().await?)
    }

    /// Close the consumer whatever `outcome` is. The outcome's error wins
    /// over a failing close.
    pub(crate) async fn close_after<T>(&mut self, outcome: Result<T>) -> Result<T> {
        let closed = self.close().await;
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(close_error) = closed {
                    tracing::warn!(
                        topic = %self.topic(),
                        group = %self.group(),
                        error = %close_error,
                        "Failed to close consumer after pipeline error"
                    );
                }
                Err(e)
            }
        }
    }
}
