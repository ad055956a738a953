//! Chunking integration tests
//!
//! Oversized values written through a chunking producer land as several
//! records and come back as one message.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tidelog_client::chunking::{CHUNKED_MESSAGE_ID, CHUNK_NUMBER, NUMBER_OF_CHUNKS};
use tidelog_client::functional::{cat, cp, head};
use tidelog_client::{ClientError, OutMessage, ReadOptions, Storage};
use tidelog_core::{
    ConsumerGroupState, ConsumerSpec, Error, LogAdmin, LogBackend, LogConfig, LogConsumer,
    LogProducer, Result, TopicConfig, Watermark,
};
use tidelog_schema::{InMemorySchemaRegistry, Payload, SchemaFormat, TypeTag};
use tidelog_storage::FileLog;

fn blob(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

#[tokio::test]
async fn test_chunked_value_round_trip() {
    let storage = Storage::memory(LogConfig::default().with_chunk_size(Some(16))).unwrap();
    storage.create("blobs", 1).await.unwrap();

    let value = blob(100);
    let mut producer = storage.producer("blobs").await.unwrap();
    let positions = producer
        .produce_one(
            OutMessage::new(value.clone())
                .with_key(Bytes::from_static(b"blob"))
                .with_header("kind", Bytes::from_static(b"image")),
        )
        .await
        .unwrap();
    assert_eq!(positions.len(), 7);
    assert_eq!(storage.watermarks("blobs").await.unwrap()[&0].high, 7);

    let raw = cat(&storage, "blobs", &ReadOptions::default()).await.unwrap();
    assert_eq!(raw.len(), 1);
    let message = &raw[0];
    assert_eq!(message.value, Some(Payload::Bytes(value)));
    assert_eq!(message.key, Some(Payload::Bytes(Bytes::from_static(b"blob"))));
    assert_eq!(message.offset, 6);
    assert_eq!(message.headers.len(), 1);
    assert_eq!(message.header("kind"), Some(&Bytes::from_static(b"image")));
    assert!(message.header(CHUNKED_MESSAGE_ID).is_none());
}

#[tokio::test]
async fn test_stored_chunk_records() {
    let storage = Storage::memory(LogConfig::default().with_chunk_size(Some(10))).unwrap();
    storage.create("blobs", 1).await.unwrap();
    storage
        .producer("blobs")
        .await
        .unwrap()
        .produce_one(OutMessage::new(blob(25)).with_key(Bytes::from_static(b"k")))
        .await
        .unwrap();

    // Read the stored records directly through the backend.
    let mut consumer = storage
        .backend()
        .open_consumer(ConsumerSpec::topic("blobs"))
        .await
        .unwrap();
    let records = consumer.consume(100).await.unwrap();
    assert_eq!(records.len(), 3);
    for (index, record) in records.iter().enumerate() {
        assert_eq!(record.header(NUMBER_OF_CHUNKS).unwrap(), &Bytes::from_static(b"3"));
        assert_eq!(
            record.header(CHUNK_NUMBER).unwrap(),
            &Bytes::from(index.to_string())
        );
        assert_eq!(
            record.key.as_deref(),
            Some(format!("k_{index:09}").as_bytes())
        );
    }
}

#[tokio::test]
async fn test_head_waits_for_complete_message() {
    let storage = Storage::memory(LogConfig::default().with_chunk_size(Some(8))).unwrap();
    storage.create("blobs", 1).await.unwrap();
    let mut producer = storage.producer("blobs").await.unwrap();
    producer
        .produce(vec![OutMessage::new(blob(40)), OutMessage::new(blob(3))])
        .await
        .unwrap();

    let first = head(&storage, "blobs", &ReadOptions::default(), 1)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].value, Some(Payload::Bytes(blob(40))));
}

fn chunk(id: &str, index: usize, value: &'static [u8]) -> OutMessage {
    OutMessage::new(Bytes::from_static(value))
        .with_header(CHUNKED_MESSAGE_ID, Bytes::from(id.to_string()))
        .with_header(NUMBER_OF_CHUNKS, Bytes::from_static(b"2"))
        .with_header(CHUNK_NUMBER, Bytes::from(index.to_string()))
}

#[tokio::test]
async fn test_pending_limit_from_storage_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let writer = Storage::local(dir.path(), LogConfig::default()).unwrap();
    writer.create("interleaved", 1).await.unwrap();
    writer
        .producer("interleaved")
        .await
        .unwrap()
        .produce(vec![
            chunk("a", 0, b"a0"),
            chunk("b", 0, b"b0"),
            chunk("a", 1, b"a1"),
            chunk("b", 1, b"b1"),
        ])
        .await
        .unwrap();

    let roomy = cat(&writer, "interleaved", &ReadOptions::default())
        .await
        .unwrap();
    let values: Vec<Option<Payload>> = roomy.into_iter().map(|m| m.value).collect();
    assert_eq!(
        values,
        vec![
            Some(Payload::Bytes(Bytes::from_static(b"a0a1"))),
            Some(Payload::Bytes(Bytes::from_static(b"b0b1"))),
        ]
    );

    // With room for one incomplete message, each new id evicts the other.
    let tight = Storage::local(
        dir.path(),
        LogConfig::default().with_chunk_buffer_max_pending(1),
    )
    .unwrap();
    let read = cat(&tight, "interleaved", &ReadOptions::default())
        .await
        .unwrap();
    assert!(read.is_empty());
}

#[tokio::test]
async fn test_framed_values_chunk_and_reassemble() {
    let registry = Arc::new(InMemorySchemaRegistry::new());
    let schema_id = registry
        .register("events-value", SchemaFormat::Json, r#"{"type": "object"}"#)
        .await
        .unwrap();

    let config = LogConfig::default()
        .with_types("str", "jsonschema")
        .with_chunk_size(Some(12));
    let storage = Storage::memory(config)
        .unwrap()
        .with_schema_resolver(registry);
    storage.create("events", 2).await.unwrap();

    let payload = Payload::JsonSchema {
        schema_id,
        value: serde_json::json!({"text": "a value long enough to span several chunks"}),
    };
    storage
        .producer("events")
        .await
        .unwrap()
        .produce_one(OutMessage {
            key: Some(Payload::from("e-1")),
            value: Some(payload.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    let read = cat(&storage, "events", &ReadOptions::default()).await.unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].value, Some(payload));
    assert_eq!(read[0].key, Some(Payload::from("e-1")));
}

#[tokio::test]
async fn test_cp_preserves_chunked_values() {
    let config = LogConfig::default().with_chunk_size(Some(32));
    let source = Storage::memory(config.clone()).unwrap();
    let target = Storage::memory(config).unwrap();
    source.create("in", 1).await.unwrap();
    target.create("out", 1).await.unwrap();

    let values = [blob(10), blob(100), blob(33)];
    source
        .producer("in")
        .await
        .unwrap()
        .produce(values.iter().cloned().map(OutMessage::new).collect())
        .await
        .unwrap();

    let (consumed, produced) = cp(&source, "in", &ReadOptions::default(), &target, "out")
        .await
        .unwrap();
    assert_eq!((consumed, produced), (3, 3));

    let copied = cat(&target, "out", &ReadOptions::default()).await.unwrap();
    let copied: Vec<_> = copied.into_iter().filter_map(|m| m.value).collect();
    assert_eq!(copied, values.map(Payload::Bytes).to_vec());
}

/// A backend that stores records but refuses chunked writes, like a broker
/// with a message size limit enforced elsewhere.
struct NoChunking(FileLog);

#[async_trait]
impl LogAdmin for NoChunking {
    async fn create_topic(&self, topic: &str, partitions: u32, config: TopicConfig) -> Result<()> {
        self.0.create_topic(topic, partitions, config).await
    }

    async fn delete_topics(&self, pattern: &str) -> Result<Vec<String>> {
        self.0.delete_topics(pattern).await
    }

    async fn list_topics(&self, pattern: &str) -> Result<Vec<String>> {
        self.0.list_topics(pattern).await
    }

    async fn partitions(&self, pattern: &str) -> Result<BTreeMap<String, u32>> {
        self.0.partitions(pattern).await
    }

    async fn topic_config(&self, topic: &str) -> Result<TopicConfig> {
        self.0.topic_config(topic).await
    }

    async fn watermarks(&self, topic: &str) -> Result<BTreeMap<u32, Watermark>> {
        self.0.watermarks(topic).await
    }

    async fn offsets_for_times(
        &self,
        topic: &str,
        times: &BTreeMap<u32, i64>,
    ) -> Result<BTreeMap<u32, u64>> {
        self.0.offsets_for_times(topic, times).await
    }

    async fn list_groups(&self, pattern: &str) -> Result<Vec<String>> {
        self.0.list_groups(pattern).await
    }

    async fn describe_group(&self, group: &str) -> Result<Option<ConsumerGroupState>> {
        self.0.describe_group(group).await
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        self.0.delete_group(group).await
    }
}

#[async_trait]
impl LogBackend for NoChunking {
    fn kind(&self) -> &str {
        "gateway"
    }

    fn config(&self) -> &LogConfig {
        self.0.config()
    }

    fn supports_chunking(&self) -> bool {
        false
    }

    async fn open_producer(&self, topic: &str) -> Result<Box<dyn LogProducer>> {
        self.0.open_producer(topic).await
    }

    async fn open_consumer(&self, spec: ConsumerSpec) -> Result<Box<dyn LogConsumer>> {
        self.0.open_consumer(spec).await
    }
}

#[tokio::test]
async fn test_chunking_rejected_on_unsupported_backend() {
    let chunking = FileLog::memory(LogConfig::default().with_chunk_size(Some(64))).unwrap();
    let storage = Storage::new(Arc::new(NoChunking(chunking)));
    storage.create("t", 1).await.unwrap();

    assert!(matches!(
        storage.producer("t").await,
        Err(ClientError::Core(Error::Configuration(_)))
    ));

    let plain = FileLog::memory(LogConfig::default()).unwrap();
    let storage = Storage::new(Arc::new(NoChunking(plain)));
    storage.create("t", 1).await.unwrap();
    let mut producer = storage
        .producer_with_types("t", TypeTag::Bytes, TypeTag::Bytes)
        .await
        .unwrap();
    producer
        .produce_one(OutMessage::new(blob(500)))
        .await
        .unwrap();
}
