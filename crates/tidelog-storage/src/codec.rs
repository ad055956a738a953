//! Record line format inside partition files.
//!
//! Each record is one JSON object followed by the message separator:
//!
//! ```text
//! {"topic":"orders","partition":0,"offset":7,"timestamp":[1,1700000000000],"key":"dXNlci0x","value":"e30=","headers":[["trace","YWJj"]]}
//! ```
//!
//! Key, value and header bytes are base64 (standard alphabet, padded), so the
//! default `\n` separator can never occur inside a record.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tidelog_core::{Error, Header, Record, Result, Timestamp, TimestampType};

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    topic: String,
    partition: u32,
    offset: u64,
    timestamp: (TimestampType, i64),
    key: Option<String>,
    value: Option<String>,
    #[serde(default)]
    headers: Vec<(String, String)>,
}

impl From<&Record> for StoredRecord {
    fn from(record: &Record) -> Self {
        Self {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            timestamp: (record.timestamp.kind, record.timestamp.millis),
            key: record.key.as_ref().map(|k| STANDARD.encode(k)),
            value: record.value.as_ref().map(|v| STANDARD.encode(v)),
            headers: record
                .headers
                .iter()
                .map(|h| (h.key.clone(), STANDARD.encode(&h.value)))
                .collect(),
        }
    }
}

impl StoredRecord {
    fn into_record(self) -> std::result::Result<Record, base64::DecodeError> {
        let decode = |s: String| STANDARD.decode(s).map(Bytes::from);
        Ok(Record {
            topic: self.topic,
            partition: self.partition,
            offset: self.offset,
            timestamp: Timestamp {
                kind: self.timestamp.0,
                millis: self.timestamp.1,
            },
            key: self.key.map(decode).transpose()?,
            value: self.value.map(decode).transpose()?,
            headers: self
                .headers
                .into_iter()
                .map(|(key, value)| Ok(Header::new(key, decode(value)?)))
                .collect::<std::result::Result<_, base64::DecodeError>>()?,
        })
    }
}

/// Encodes and decodes the contents of partition files.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    separator: String,
}

impl RecordCodec {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn encode_file(&self, records: &[Record]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        for record in records {
            let line = serde_json::to_vec(&StoredRecord::from(record))?;
            buf.put_slice(&line);
            buf.put_slice(self.separator.as_bytes());
        }
        Ok(buf.freeze())
    }

    /// Decode every record of a file. `path` is only used in error messages.
    pub fn decode_file(&self, path: &str, bytes: &[u8]) -> Result<Vec<Record>> {
        let codec_error = |message: String| Error::Codec {
            path: path.to_string(),
            message,
        };

        let text = std::str::from_utf8(bytes).map_err(|e| codec_error(e.to_string()))?;
        text.split(self.separator.as_str())
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                let stored: StoredRecord = serde_json::from_str(line)
                    .map_err(|e| codec_error(format!("record {index}: {e}")))?;
                stored
                    .into_record()
                    .map_err(|e| codec_error(format!("record {index}: {e}")))
            })
            .collect()
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new("\n")
    }
}
