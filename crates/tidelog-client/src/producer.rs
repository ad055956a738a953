//! Typed producer.
//!
//! [`Producer`] encodes [`OutMessage`] keys and values with the configured
//! type tags, chunks oversized values, and hands the resulting records to
//! the backend's [`LogProducer`].

use crate::chunking::chunk_record;
use crate::consumer::Message;
use crate::error::{ClientError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tidelog_core::{Error, Header, LogBackend, LogProducer, ProducerRecord, RecordPosition};
use tidelog_schema::{Codec, Payload, TypeTag};

/// A message to be written, before encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutMessage {
    pub key: Option<Payload>,
    pub value: Option<Payload>,
    pub headers: Vec<Header>,
    pub partition: Option<u32>,
    pub timestamp: Option<i64>,
}

impl OutMessage {
    pub fn new(value: impl Into<Payload>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// A message with neither key nor value.
    pub fn tombstone() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<Payload>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }
}

/// Copying keeps key, value, headers and timestamp; the partition is chosen
/// again by the target.
impl From<Message> for OutMessage {
    fn from(message: Message) -> Self {
        Self {
            key: message.key,
            value: message.value,
            headers: message.headers,
            partition: None,
            timestamp: Some(message.timestamp.millis),
        }
    }
}

pub struct Producer {
    inner: Box<dyn LogProducer>,
    codec: Arc<Codec>,
    key_type: TypeTag,
    value_type: TypeTag,
    chunk_size: Option<usize>,
    partition_count: u32,
}

impl Producer {
    /// Open a producer on `topic`.
    ///
    /// # Errors
    ///
    /// `Configuration` if chunking is enabled but the backend cannot store
    /// the chunked records.
    pub(crate) async fn open(
        backend: &dyn LogBackend,
        codec: Arc<Codec>,
        topic: &str,
        key_type: TypeTag,
        value_type: TypeTag,
    ) -> Result<Self> {
        let chunk_size = backend.config().chunk_size_bytes;
        if chunk_size.is_some() && !backend.supports_chunking() {
            return Err(Error::Configuration(format!(
                "chunking is not supported by the {} backend",
                backend.kind()
            ))
            .into());
        }

        let partition_count = backend
            .partitions(topic)
            .await?
            .get(topic)
            .copied()
            .unwrap_or(1);
        let inner = backend.open_producer(topic).await?;

        tracing::debug!(
            topic = %topic,
            backend = backend.kind(),
            key_type = %key_type,
            value_type = %value_type,
            "Opened producer"
        );

        Ok(Self {
            inner,
            codec,
            key_type,
            value_type,
            chunk_size,
            partition_count,
        })
    }

    pub fn topic(&self) -> &str {
        self.inner.topic()
    }

    pub fn key_type(&self) -> TypeTag {
        self.key_type
    }

    pub fn value_type(&self) -> TypeTag {
        self.value_type
    }

    async fn encode(&self, message: &OutMessage) -> Result<ProducerRecord> {
        let key = match message.key {
            Some(ref key) => Some(self.codec.encode(self.key_type, key).await?),
            None => None,
        };
        let value = match message.value {
            Some(ref value) => Some(self.codec.encode(self.value_type, value).await?),
            None => None,
        };
        Ok(ProducerRecord {
            key,
            value,
            headers: message.headers.clone(),
            partition: message.partition,
            timestamp: message.timestamp,
        })
    }

    /// Encode and write a batch. Returns one position per written record,
    /// which is one per chunk for chunked messages.
    pub async fn produce(&mut self, messages: Vec<OutMessage>) -> Result<Vec<RecordPosition>> {
        let mut records = Vec::with_capacity(messages.len());
        for message in &messages {
            let record = self.encode(message).await?;
            match self.chunk_size {
                Some(size) => records.extend(chunk_record(
                    record,
                    size,
                    self.value_type.is_framed(),
                    self.partition_count,
                )),
                None => records.push(record),
            }
        }
        self.inner.produce(records).await.map_err(ClientError::from)
    }

    pub async fn produce_one(&mut self, message: OutMessage) -> Result<Vec<RecordPosition>> {
        self.produce(vec![message]).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush().await?)
    }
}
