//! Type tags and typed payloads.
//!
//! A [`TypeTag`] names how raw key or value bytes are interpreted. The same
//! tag selects the encoder on write and the decoder on read.
//!
//! | Tag | Payload | Bytes on storage |
//! |-----|---------|------------------|
//! | `bytes` | [`Payload::Bytes`] | unchanged |
//! | `str` | [`Payload::Str`] | UTF-8 |
//! | `json` | [`Payload::Json`] | JSON text |
//! | `avro` | [`Payload::Avro`] | frame header + Avro datum |
//! | `jsonschema` | [`Payload::JsonSchema`] | frame header + JSON text |
//! | `protobuf` | [`Payload::Protobuf`] | frame header + message index + wire bytes |

use crate::avro::avro_to_json;
use crate::error::{Result, SchemaError};
use crate::protobuf::ProtoMessage;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeTag {
    #[default]
    Bytes,
    Str,
    Json,
    Avro,
    JsonSchema,
    Protobuf,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Bytes => "bytes",
            TypeTag::Str => "str",
            TypeTag::Json => "json",
            TypeTag::Avro => "avro",
            TypeTag::JsonSchema => "jsonschema",
            TypeTag::Protobuf => "protobuf",
        }
    }

    /// Whether encoded payloads carry the 5-byte schema-id header.
    pub fn is_framed(&self) -> bool {
        matches!(self, TypeTag::Avro | TypeTag::JsonSchema | TypeTag::Protobuf)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bytes" => Ok(TypeTag::Bytes),
            "str" | "text" => Ok(TypeTag::Str),
            "json" => Ok(TypeTag::Json),
            "avro" => Ok(TypeTag::Avro),
            "jsonschema" | "json_sr" => Ok(TypeTag::JsonSchema),
            "protobuf" | "pb" => Ok(TypeTag::Protobuf),
            _ => Err(SchemaError::UnsupportedType(s.to_string())),
        }
    }
}

/// A decoded key or value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Bytes),
    Str(String),
    Json(serde_json::Value),
    Avro {
        schema_id: i32,
        value: apache_avro::types::Value,
    },
    JsonSchema {
        schema_id: i32,
        value: serde_json::Value,
    },
    Protobuf {
        schema_id: i32,
        message: ProtoMessage,
    },
}

impl Payload {
    /// The tag this payload encodes under.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Payload::Bytes(_) => TypeTag::Bytes,
            Payload::Str(_) => TypeTag::Str,
            Payload::Json(_) => TypeTag::Json,
            Payload::Avro { .. } => TypeTag::Avro,
            Payload::JsonSchema { .. } => TypeTag::JsonSchema,
            Payload::Protobuf { .. } => TypeTag::Protobuf,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) | Payload::JsonSchema { value: v, .. } => Some(v),
            _ => None,
        }
    }

    /// Human-readable rendering, used by text tools such as grep and wc.
    pub fn to_text(&self) -> String {
        match self {
            Payload::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Payload::Str(s) => s.clone(),
            Payload::Json(v) | Payload::JsonSchema { value: v, .. } => v.to_string(),
            Payload::Avro { value, .. } => avro_to_json(value).to_string(),
            Payload::Protobuf { message, .. } => message.to_json().to_string(),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Str(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Str(value.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}
