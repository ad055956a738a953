//! Chunking and dechunking of oversized values.
//!
//! ## Write side
//!
//! A value longer than `chunk_size` is cut into `ceil(len / chunk_size)`
//! slices. Every slice becomes its own record with three headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `chunked_message_id` | random id shared by all chunks of one message |
//! | `number_of_chunks` | total chunk count, decimal |
//! | `chunk_number` | zero-based index of this chunk, decimal |
//!
//! Keys get a `_NNNNNNNNN` suffix (the chunk index). Chunks of schema-framed
//! values after the first are prefixed with the original 5-byte frame
//! header so each one is a valid framed payload on its own. All chunks of a
//! message go to the same partition.
//!
//! ## Read side
//!
//! [`Dechunker`] buffers chunks per message id in pre-sized slots and emits
//! one record once every slot is filled, carrying the metadata of the chunk
//! that completed it. At most `max_pending` incomplete messages are kept;
//! the oldest is dropped when a new one would exceed the limit.

use crate::error::{ClientError, Result};
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use tidelog_core::{partition_for_key, ProducerRecord, Record};
use tidelog_schema::FRAME_HEADER_LEN;

pub const CHUNKED_MESSAGE_ID: &str = "chunked_message_id";
pub const NUMBER_OF_CHUNKS: &str = "number_of_chunks";
pub const CHUNK_NUMBER: &str = "chunk_number";

/// `_` plus nine digits.
const KEY_SUFFIX_LEN: usize = 10;

fn is_chunk_header(name: &str) -> bool {
    matches!(name, CHUNKED_MESSAGE_ID | NUMBER_OF_CHUNKS | CHUNK_NUMBER)
}

fn chunk_key(key: &[u8], index: usize) -> Bytes {
    let mut out = BytesMut::with_capacity(key.len() + KEY_SUFFIX_LEN);
    out.extend_from_slice(key);
    out.extend_from_slice(format!("_{index:09}").as_bytes());
    out.freeze()
}

fn strip_chunk_key(key: &Bytes) -> Bytes {
    if key.len() < KEY_SUFFIX_LEN {
        return key.clone();
    }
    let split = key.len() - KEY_SUFFIX_LEN;
    let suffix = &key[split..];
    if suffix[0] == b'_' && suffix[1..].iter().all(u8::is_ascii_digit) {
        key.slice(..split)
    } else {
        key.clone()
    }
}

/// Split `record` into chunk records if its value exceeds `chunk_size`.
///
/// Records that fit are returned unchanged as a single element. `framed`
/// says whether the value starts with a schema frame header.
pub fn chunk_record(
    record: ProducerRecord,
    chunk_size: usize,
    framed: bool,
    partition_count: u32,
) -> Vec<ProducerRecord> {
    let value = match record.value {
        Some(ref value) if chunk_size > 0 && value.len() > chunk_size => value.clone(),
        _ => return vec![record],
    };

    let id = uuid::Uuid::new_v4().to_string();
    let prefix = if framed && value.len() >= FRAME_HEADER_LEN {
        Some(value.slice(..FRAME_HEADER_LEN))
    } else {
        None
    };
    let count = value.len().div_ceil(chunk_size);

    // Pin every chunk to the partition the whole message would have used.
    let partition = record.partition.unwrap_or_else(|| match record.key {
        Some(ref key) => partition_for_key(key, partition_count),
        None => partition_for_key(id.as_bytes(), partition_count),
    });

    tracing::debug!(
        chunked_message_id = %id,
        chunks = count,
        bytes = value.len(),
        partition,
        "Chunking record"
    );

    (0..count)
        .map(|index| {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(value.len());
            let slice = value.slice(start..end);

            let chunk_value = match prefix {
                Some(ref prefix) if index > 0 => {
                    let mut buf = BytesMut::with_capacity(prefix.len() + slice.len());
                    buf.extend_from_slice(prefix);
                    buf.extend_from_slice(&slice);
                    buf.freeze()
                }
                _ => slice,
            };

            ProducerRecord {
                key: record.key.as_ref().map(|key| chunk_key(key, index)),
                value: Some(chunk_value),
                headers: record.headers.clone(),
                partition: Some(partition),
                timestamp: record.timestamp,
            }
            .with_header(CHUNKED_MESSAGE_ID, Bytes::from(id.clone()))
            .with_header(NUMBER_OF_CHUNKS, Bytes::from(count.to_string()))
            .with_header(CHUNK_NUMBER, Bytes::from(index.to_string()))
        })
        .collect()
}

struct PendingMessage {
    slots: Vec<Option<Bytes>>,
    filled: usize,
}

/// Reassembles chunked records read from a log.
pub struct Dechunker {
    framed: bool,
    max_pending: usize,
    pending: HashMap<String, PendingMessage>,
    arrival: VecDeque<String>,
}

impl Dechunker {
    pub fn new(framed: bool, max_pending: usize) -> Self {
        Self {
            framed,
            max_pending: max_pending.max(1),
            pending: HashMap::new(),
            arrival: VecDeque::new(),
        }
    }

    /// Incomplete messages currently buffered.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed one record. Returns it unchanged when it is not a chunk, the
    /// reassembled record when it completes a message, `None` otherwise.
    pub fn push(&mut self, record: Record) -> Result<Option<Record>> {
        let Some(id) = record.header(CHUNKED_MESSAGE_ID) else {
            return Ok(Some(record));
        };
        let invalid = |reason: String| ClientError::InvalidChunk {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            reason,
        };

        let id = String::from_utf8(id.to_vec())
            .map_err(|_| invalid("chunked_message_id is not UTF-8".into()))?;
        let count = header_number(&record, NUMBER_OF_CHUNKS).map_err(&invalid)?;
        let index = header_number(&record, CHUNK_NUMBER).map_err(&invalid)?;
        if count == 0 || index >= count {
            return Err(invalid(format!("chunk {index} of {count}")));
        }

        if !self.pending.contains_key(&id) {
            self.evict_if_full();
            self.arrival.push_back(id.clone());
            self.pending.insert(
                id.clone(),
                PendingMessage {
                    slots: vec![None; count],
                    filled: 0,
                },
            );
        }
        let Some(message) = self.pending.get_mut(&id) else {
            return Ok(None);
        };
        if message.slots.len() != count {
            return Err(invalid(format!(
                "expected {} chunks, header says {count}",
                message.slots.len()
            )));
        }

        let value = record.value.clone().unwrap_or_default();
        if message.slots[index].replace(value).is_none() {
            message.filled += 1;
        }
        if message.filled < count {
            return Ok(None);
        }

        let slots = match self.pending.remove(&id) {
            Some(message) => message.slots,
            None => return Ok(None),
        };
        self.arrival.retain(|pending| pending != &id);
        Ok(Some(self.reassemble(record, slots)))
    }

    fn reassemble(&self, last: Record, slots: Vec<Option<Bytes>>) -> Record {
        let mut value = BytesMut::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let chunk = slot.unwrap_or_default();
            if self.framed && index > 0 && chunk.len() >= FRAME_HEADER_LEN {
                value.extend_from_slice(&chunk[FRAME_HEADER_LEN..]);
            } else {
                value.extend_from_slice(&chunk);
            }
        }

        Record {
            key: last.key.as_ref().map(strip_chunk_key),
            value: Some(value.freeze()),
            headers: last
                .headers
                .into_iter()
                .filter(|h| !is_chunk_header(&h.key))
                .collect(),
            ..last
        }
    }

    fn evict_if_full(&mut self) {
        while self.pending.len() >= self.max_pending {
            let Some(oldest) = self.arrival.pop_front() else {
                break;
            };
            if let Some(dropped) = self.pending.remove(&oldest) {
                tracing::warn!(
                    chunked_message_id = %oldest,
                    received = dropped.filled,
                    expected = dropped.slots.len(),
                    "Dropping incomplete chunked message"
                );
            }
        }
    }
}

fn header_number(record: &Record, name: &str) -> std::result::Result<usize, String> {
    let raw = record
        .header(name)
        .ok_or_else(|| format!("missing {name} header"))?;
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("{name} is not a number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidelog_core::{Header, Timestamp};

    fn as_read(records: Vec<ProducerRecord>) -> Vec<Record> {
        records
            .into_iter()
            .enumerate()
            .map(|(offset, r)| Record {
                topic: "blobs".to_string(),
                partition: r.partition.unwrap_or(0),
                offset: offset as u64 + 10,
                timestamp: Timestamp::create_time(1_000 + offset as i64),
                key: r.key,
                value: r.value,
                headers: r.headers,
            })
            .collect()
    }

    #[test]
    fn test_small_record_untouched() {
        let record = ProducerRecord::new(None, Some(Bytes::from_static(b"tiny")));
        let chunks = chunk_record(record.clone(), 16, false, 4);
        assert_eq!(chunks, vec![record]);
    }

    #[test]
    fn test_chunk_count_and_headers() {
        let value = Bytes::from(vec![7u8; 25]);
        let record = ProducerRecord::new(Some(Bytes::from_static(b"k")), Some(value))
            .with_header("trace", Bytes::from_static(b"abc"));
        let chunks = chunk_record(record, 10, false, 4);

        assert_eq!(chunks.len(), 3);
        let id = chunks[0].headers.iter().find(|h| h.key == CHUNKED_MESSAGE_ID);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(
                chunk.headers.iter().find(|h| h.key == CHUNKED_MESSAGE_ID),
                id
            );
            assert!(chunk
                .headers
                .contains(&Header::new(NUMBER_OF_CHUNKS, Bytes::from_static(b"3"))));
            assert!(chunk
                .headers
                .contains(&Header::new(CHUNK_NUMBER, Bytes::from(index.to_string()))));
            assert_eq!(
                chunk.key.as_deref(),
                Some(format!("k_{index:09}").as_bytes())
            );
            assert_eq!(chunk.partition, Some(partition_for_key(b"k", 4)));
        }
        assert_eq!(chunks[2].value.as_ref().map(Bytes::len), Some(5));
    }

    #[test]
    fn test_reassemble_out_of_order() {
        let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let record = ProducerRecord::new(
            Some(Bytes::from_static(b"big")),
            Some(Bytes::from(original.clone())),
        )
        .with_header("trace", Bytes::from_static(b"abc"));

        let mut chunks = as_read(chunk_record(record, 64, false, 1));
        assert_eq!(chunks.len(), 16);
        chunks.reverse();
        let last = chunks.last().cloned().unwrap();

        let mut dechunker = Dechunker::new(false, 8);
        let mut emitted = Vec::new();
        for chunk in chunks {
            if let Some(record) = dechunker.push(chunk).unwrap() {
                emitted.push(record);
            }
        }

        assert_eq!(emitted.len(), 1);
        let message = &emitted[0];
        assert_eq!(message.value.as_deref(), Some(&original[..]));
        assert_eq!(message.key.as_deref(), Some(&b"big"[..]));
        assert_eq!(message.headers, vec![Header::new("trace", Bytes::from_static(b"abc"))]);
        assert_eq!(message.offset, last.offset);
        assert_eq!(message.timestamp, last.timestamp);
        assert_eq!(dechunker.pending(), 0);
    }

    #[test]
    fn test_framed_prefix_repeated_and_stripped() {
        let mut original = vec![0x00, 0x00, 0x00, 0x00, 0x07];
        original.extend_from_slice(b"abcdefghijklmnop");
        let record = ProducerRecord::new(None, Some(Bytes::from(original.clone())));

        let chunks = chunk_record(record, 8, true, 3);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            let value = chunk.value.as_ref().unwrap();
            assert_eq!(&value[..5], &original[..5]);
            assert!(chunk.key.is_none());
        }
        assert!(chunks.iter().all(|c| c.partition == chunks[0].partition));

        let mut dechunker = Dechunker::new(true, 8);
        let mut out = None;
        for chunk in as_read(chunks) {
            out = dechunker.push(chunk).unwrap();
        }
        assert_eq!(out.unwrap().value.as_deref(), Some(&original[..]));
    }

    #[test]
    fn test_plain_records_pass_through() {
        let mut dechunker = Dechunker::new(false, 8);
        let record = as_read(vec![ProducerRecord::new(None, Some(Bytes::from_static(b"v")))])
            .remove(0);
        assert_eq!(dechunker.push(record.clone()).unwrap(), Some(record));
    }

    #[test]
    fn test_oldest_incomplete_message_evicted() {
        let mut dechunker = Dechunker::new(false, 2);
        for key in ["a", "b", "c"] {
            let record = ProducerRecord::new(
                Some(Bytes::from(key.to_string())),
                Some(Bytes::from(vec![1u8; 20])),
            );
            let first = as_read(chunk_record(record, 10, false, 1)).remove(0);
            assert!(dechunker.push(first).unwrap().is_none());
        }
        assert_eq!(dechunker.pending(), 2);
    }

    #[test]
    fn test_bad_chunk_headers() {
        let mut dechunker = Dechunker::new(false, 2);
        let record = Record {
            topic: "blobs".to_string(),
            partition: 0,
            offset: 3,
            timestamp: Timestamp::create_time(0),
            key: None,
            value: None,
            headers: vec![
                Header::new(CHUNKED_MESSAGE_ID, Bytes::from_static(b"x")),
                Header::new(NUMBER_OF_CHUNKS, Bytes::from_static(b"2")),
                Header::new(CHUNK_NUMBER, Bytes::from_static(b"5")),
            ],
        };
        assert!(matches!(
            dechunker.push(record),
            Err(ClientError::InvalidChunk { offset: 3, .. })
        ));
    }
}
