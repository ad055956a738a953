//! Record Data Structures
//!
//! This module defines the data model shared by every backend.
//!
//! ## Record
//! A record is a single message in a partition, shaped like a Kafka message:
//! - **key**: optional bytes, used for partition routing
//! - **value**: optional bytes (a tombstone has no value)
//! - **headers**: ordered `(name, bytes)` pairs; names may repeat
//! - **timestamp**: `(type, millis)` pair, see [`TimestampType`]
//! - **partition/offset**: assigned by the writer, never chosen by producers
//!
//! ## ProducerRecord
//! What callers hand to a writer: the same payload fields plus optional
//! partition and timestamp overrides. Offsets are a writer output.
//!
//! ## Consumer Group State
//! The persisted cursor of a consumer group: next-offset-to-read per topic
//! and partition plus a lifecycle flag. Serialized as
//! `{"offsets": {topic: {partition: offset}}, "state": "stable"|"empty"}`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::collections::BTreeMap;
use std::hash::Hasher;

/// Topic-level key/value configuration (e.g. `retention.ms`).
pub type TopicConfig = BTreeMap<String, String>;

/// Get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Deterministic partition for a key: SipHash-1-3 of the key bytes modulo
/// the partition count.
///
/// Every writer (and the chunking layer, which pins all chunks of one message
/// to the partition of the original key) uses this function, so the same key
/// always lands in the same partition for a given partition count.
pub fn partition_for_key(key: &[u8], partition_count: u32) -> u32 {
    if partition_count <= 1 {
        return 0;
    }
    let mut hasher = SipHasher13::new();
    hasher.write(key);
    (hasher.finish() % partition_count as u64) as u32
}

/// Source of a record timestamp, numbered like Kafka's timestamp types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TimestampType {
    NotAvailable,
    #[default]
    CreateTime,
    LogAppendTime,
}

impl From<TimestampType> for i32 {
    fn from(value: TimestampType) -> Self {
        match value {
            TimestampType::NotAvailable => 0,
            TimestampType::CreateTime => 1,
            TimestampType::LogAppendTime => 2,
        }
    }
}

impl TryFrom<i32> for TimestampType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TimestampType::NotAvailable),
            1 => Ok(TimestampType::CreateTime),
            2 => Ok(TimestampType::LogAppendTime),
            other => Err(format!("unknown timestamp type {other}")),
        }
    }
}

/// A `(type, millis)` timestamp pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub kind: TimestampType,
    pub millis: i64,
}

impl Timestamp {
    pub fn create_time(millis: i64) -> Self {
        Self {
            kind: TimestampType::CreateTime,
            millis,
        }
    }

    pub fn now() -> Self {
        Self::create_time(now_ms())
    }
}

/// A single record header. Order is significant and names may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: Bytes,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single record read back from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: Timestamp,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

impl Record {
    /// First header value with the given name.
    pub fn header(&self, key: &str) -> Option<&Bytes> {
        self.headers.iter().find(|h| h.key == key).map(|h| &h.value)
    }
}

/// A record as handed to a writer, before partition and offset assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerRecord {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
    /// Explicit partition; wins over key hashing and round-robin.
    pub partition: Option<u32>,
    /// Explicit create-time timestamp in milliseconds; defaults to now.
    pub timestamp: Option<i64>,
}

impl ProducerRecord {
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            key,
            value,
            ..Default::default()
        }
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

/// Where a produced record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPosition {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: Timestamp,
}

/// Offset bounds currently available for a partition.
///
/// `high` is the next offset to be written; an empty partition has
/// `low == high == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub low: u64,
    pub high: u64,
}

impl Watermark {
    /// Number of records currently retained in the partition.
    pub fn len(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lifecycle flag of a consumer group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupLifecycle {
    #[default]
    Stable,
    Empty,
}

/// Persisted state of a consumer group.
///
/// Offsets are "next offset to read", not "last offset read": a group that
/// processed offsets 0-99 of a partition stores 100.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroupState {
    #[serde(default)]
    pub offsets: BTreeMap<String, BTreeMap<u32, u64>>,
    #[serde(default)]
    pub state: GroupLifecycle,
}

impl ConsumerGroupState {
    /// Committed next-offsets of one topic, if the group ever read it.
    pub fn topic_offsets(&self, topic: &str) -> Option<&BTreeMap<u32, u64>> {
        self.offsets.get(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_for_key_is_stable() {
        let p1 = partition_for_key(b"user-42", 8);
        let p2 = partition_for_key(b"user-42", 8);
        assert_eq!(p1, p2);
        assert!(p1 < 8);
        assert_eq!(partition_for_key(b"anything", 1), 0);
    }

    #[test]
    fn test_group_state_json_layout() {
        let mut state = ConsumerGroupState::default();
        state
            .offsets
            .entry("orders".to_string())
            .or_default()
            .insert(0, 42);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"offsets": {"orders": {"0": 42}}, "state": "stable"})
        );

        let back: ConsumerGroupState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_timestamp_type_serializes_as_number() {
        let ts = Timestamp::create_time(1_700_000_000_000);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, r#"{"kind":1,"millis":1700000000000}"#);
    }

    #[test]
    fn test_watermark_len() {
        let wm = Watermark { low: 5, high: 12 };
        assert_eq!(wm.len(), 7);
        assert!(Watermark::default().is_empty());
    }
}
