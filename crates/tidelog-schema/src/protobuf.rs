//! Protobuf wire walker.
//!
//! Messages are decoded structurally, without generated types: every field
//! becomes a `(number, wire value)` pair, and names are attached from the
//! first message declared in the registered `.proto` text when available.
//!
//! Framed protobuf payloads carry a Confluent message-index array between
//! the frame header and the message bytes. Only the first message of a
//! schema is addressed, which is written as the single byte `0`.

use crate::error::{Result, SchemaError};
use crate::varint::{decode_varint, decode_zigzag, encode_varint};
use bytes::{Buf, BufMut, Bytes};
use std::collections::BTreeMap;

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoValue {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(Bytes),
    Fixed32(u32),
}

impl ProtoValue {
    fn wire_type(&self) -> u64 {
        match self {
            ProtoValue::Varint(_) => WIRE_VARINT,
            ProtoValue::Fixed64(_) => WIRE_FIXED64,
            ProtoValue::LengthDelimited(_) => WIRE_LEN,
            ProtoValue::Fixed32(_) => WIRE_FIXED32,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            ProtoValue::Varint(v) | ProtoValue::Fixed64(v) => serde_json::Value::from(*v),
            ProtoValue::Fixed32(v) => serde_json::Value::from(*v),
            ProtoValue::LengthDelimited(b) => match std::str::from_utf8(b) {
                Ok(s) => serde_json::Value::String(s.to_string()),
                Err(_) => serde_json::Value::from(b.to_vec()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoField {
    pub number: u32,
    pub name: Option<String>,
    pub value: ProtoValue,
}

/// A decoded message. Field order is wire order; repeated fields appear once
/// per occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtoMessage {
    pub fields: Vec<ProtoField>,
}

impl ProtoMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, number: u32, value: ProtoValue) -> Self {
        self.fields.push(ProtoField {
            number,
            name: None,
            value,
        });
        self
    }

    pub fn with_string(self, number: u32, value: &str) -> Self {
        self.with_field(
            number,
            ProtoValue::LengthDelimited(Bytes::copy_from_slice(value.as_bytes())),
        )
    }

    /// First value of the field with this name.
    pub fn get(&self, name: &str) -> Option<&ProtoValue> {
        self.fields
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .map(|f| &f.value)
    }

    /// First value of the field with this number.
    pub fn get_number(&self, number: u32) -> Option<&ProtoValue> {
        self.fields
            .iter()
            .find(|f| f.number == number)
            .map(|f| &f.value)
    }

    /// JSON object keyed by field name (or number when unnamed). Repeated
    /// fields become arrays.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for field in &self.fields {
            let key = field
                .name
                .clone()
                .unwrap_or_else(|| field.number.to_string());
            let value = field.value.to_json();
            match object.get_mut(&key) {
                None => {
                    object.insert(key, value);
                }
                Some(serde_json::Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = serde_json::Value::Array(vec![first, value]);
                }
            }
        }
        serde_json::Value::Object(object)
    }
}

/// Field names of the first message declared in a `.proto` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoDescriptor {
    pub message: String,
    pub fields: BTreeMap<u32, String>,
}

impl ProtoDescriptor {
    pub fn parse(schema_id: i32, text: &str) -> Result<Self> {
        let tokens = tokenize(&strip_comments(text));
        let invalid = |message: &str| SchemaError::InvalidSchema {
            id: schema_id,
            message: message.to_string(),
        };

        let start = tokens
            .iter()
            .position(|t| t == "message")
            .ok_or_else(|| invalid("no message declaration"))?;
        let message = tokens
            .get(start + 1)
            .cloned()
            .ok_or_else(|| invalid("message without a name"))?;
        if tokens.get(start + 2).map(String::as_str) != Some("{") {
            return Err(invalid("message body must start with '{'"));
        }

        let mut fields = BTreeMap::new();
        // Kinds of the blocks opened inside the message; oneof members are
        // fields of the enclosing message.
        let mut blocks: Vec<String> = Vec::new();
        let mut statement: Vec<&str> = Vec::new();

        for token in &tokens[start + 3..] {
            match token.as_str() {
                "{" => {
                    blocks.push(statement.first().copied().unwrap_or_default().to_string());
                    statement.clear();
                }
                "}" => {
                    if blocks.pop().is_none() {
                        break;
                    }
                    statement.clear();
                }
                ";" => {
                    if blocks.iter().all(|b| b == "oneof") {
                        if let Some((number, name)) = parse_field(&statement) {
                            fields.insert(number, name);
                        }
                    }
                    statement.clear();
                }
                other => statement.push(other),
            }
        }

        Ok(Self { message, fields })
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);

    out.lines()
        .map(|line| line.split("//").next().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_whitespace() || matches!(c, '{' | '}' | ';' | '=') {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if !c.is_whitespace() {
                tokens.push(c.to_string());
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// `[label] type name = number [options]`
fn parse_field(statement: &[&str]) -> Option<(u32, String)> {
    const NOT_FIELDS: [&str; 6] = ["option", "reserved", "extensions", "syntax", "package", "import"];
    if NOT_FIELDS.contains(statement.first()?) {
        return None;
    }
    let eq = statement.iter().position(|t| *t == "=")?;
    if eq < 2 {
        return None;
    }
    let number = statement.get(eq + 1)?.trim_end_matches(|c: char| !c.is_ascii_digit());
    Some((number.parse().ok()?, statement[eq - 1].to_string()))
}

pub fn encode_message(message: &ProtoMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    for field in &message.fields {
        encode_varint(&mut buf, ((field.number as u64) << 3) | field.value.wire_type());
        match &field.value {
            ProtoValue::Varint(v) => encode_varint(&mut buf, *v),
            ProtoValue::Fixed64(v) => buf.put_u64_le(*v),
            ProtoValue::Fixed32(v) => buf.put_u32_le(*v),
            ProtoValue::LengthDelimited(b) => {
                encode_varint(&mut buf, b.len() as u64);
                buf.put_slice(b);
            }
        }
    }
    buf
}

pub fn decode_message(data: &[u8], descriptor: Option<&ProtoDescriptor>) -> Result<ProtoMessage> {
    let truncated = || SchemaError::DeserializationError("truncated protobuf message".into());
    let mut buf = data;
    let mut message = ProtoMessage::new();

    while buf.has_remaining() {
        let key = decode_varint(&mut buf).ok_or_else(truncated)?;
        let number = (key >> 3) as u32;
        let value = match key & 0x7 {
            WIRE_VARINT => ProtoValue::Varint(decode_varint(&mut buf).ok_or_else(truncated)?),
            WIRE_FIXED64 if buf.remaining() >= 8 => ProtoValue::Fixed64(buf.get_u64_le()),
            WIRE_FIXED32 if buf.remaining() >= 4 => ProtoValue::Fixed32(buf.get_u32_le()),
            WIRE_LEN => {
                let len = decode_varint(&mut buf).ok_or_else(truncated)? as usize;
                if buf.remaining() < len {
                    return Err(truncated());
                }
                let value = Bytes::copy_from_slice(&buf[..len]);
                buf.advance(len);
                ProtoValue::LengthDelimited(value)
            }
            WIRE_FIXED64 | WIRE_FIXED32 => return Err(truncated()),
            other => {
                return Err(SchemaError::DeserializationError(format!(
                    "unsupported protobuf wire type {other} for field {number}"
                )))
            }
        };
        if number == 0 {
            return Err(SchemaError::DeserializationError(
                "protobuf field number 0".into(),
            ));
        }
        message.fields.push(ProtoField {
            number,
            name: descriptor.and_then(|d| d.fields.get(&number).cloned()),
            value,
        });
    }
    Ok(message)
}

/// Message-index array addressing the first message of the schema.
pub fn write_message_index(buf: &mut impl BufMut) {
    buf.put_u8(0);
}

/// Skip the message-index array at the start of `buf`.
pub fn skip_message_indexes(buf: &mut &[u8]) -> Result<()> {
    let invalid = || SchemaError::DeserializationError("invalid protobuf message index".into());
    let count = decode_zigzag(buf).ok_or_else(invalid)?;
    if count < 0 {
        return Err(invalid());
    }
    for _ in 0..count {
        decode_zigzag(buf).ok_or_else(invalid)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_PROTO: &str = r#"
        syntax = "proto3";
        package shop;

        /* An order
           placed by a customer */
        message Order {
            int64 id = 1;            // primary key
            string item = 2;
            repeated string tags = 3 [packed = false];
            oneof payment {
                string card = 4;
                string voucher = 5;
            }
            message Line { int32 qty = 1; }
            map<string, int32> extras = 6;
            reserved 9;
        }

        message Other { string x = 1; }
    "#;

    #[test]
    fn test_parse_descriptor() {
        let descriptor = ProtoDescriptor::parse(1, ORDER_PROTO).unwrap();
        assert_eq!(descriptor.message, "Order");
        assert_eq!(
            descriptor.fields,
            BTreeMap::from([
                (1, "id".to_string()),
                (2, "item".to_string()),
                (3, "tags".to_string()),
                (4, "card".to_string()),
                (5, "voucher".to_string()),
                (6, "extras".to_string()),
            ])
        );
    }

    #[test]
    fn test_parse_without_message_fails() {
        assert!(matches!(
            ProtoDescriptor::parse(4, "syntax = \"proto3\";"),
            Err(SchemaError::InvalidSchema { id: 4, .. })
        ));
    }

    #[test]
    fn test_wire_format_matches_reference() {
        // Field 1 = 150 from the protobuf encoding guide.
        let message = ProtoMessage::new().with_field(1, ProtoValue::Varint(150));
        assert_eq!(encode_message(&message), vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn test_decode_attaches_names() {
        let descriptor = ProtoDescriptor::parse(1, ORDER_PROTO).unwrap();
        let message = ProtoMessage::new()
            .with_field(1, ProtoValue::Varint(42))
            .with_string(2, "widget")
            .with_string(3, "a")
            .with_string(3, "b")
            .with_field(7, ProtoValue::Fixed32(9));

        let decoded = decode_message(&encode_message(&message), Some(&descriptor)).unwrap();
        assert_eq!(decoded.get("id"), Some(&ProtoValue::Varint(42)));
        assert_eq!(decoded.get_number(7), Some(&ProtoValue::Fixed32(9)));
        assert_eq!(
            decoded.to_json(),
            serde_json::json!({"id": 42, "item": "widget", "tags": ["a", "b"], "7": 9})
        );
    }

    #[test]
    fn test_decode_truncated() {
        assert!(decode_message(&[0x12, 0x05, b'a'], None).is_err());
        assert!(decode_message(&[0x09, 0x01], None).is_err());
    }

    #[test]
    fn test_message_index() {
        let mut buf = Vec::new();
        write_message_index(&mut buf);
        buf.extend_from_slice(&[0x08, 0x01]);

        let mut cursor = &buf[..];
        skip_message_indexes(&mut cursor).unwrap();
        assert_eq!(cursor, &[0x08, 0x01]);

        // Explicit path [1, 0]: count 2 then indexes, all zigzag.
        let mut cursor = &[0x04, 0x02, 0x00, 0x08][..];
        skip_message_indexes(&mut cursor).unwrap();
        assert_eq!(cursor, &[0x08]);
    }
}
