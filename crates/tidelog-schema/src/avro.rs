//! Avro datum encoding with generic values.

use crate::error::{Result, SchemaError};
use apache_avro::types::Value;
use apache_avro::Schema;

/// Parse an Avro schema definition.
pub fn parse_schema(id: i32, definition: &str) -> Result<Schema> {
    Schema::parse_str(definition).map_err(|e| SchemaError::InvalidSchema {
        id,
        message: e.to_string(),
    })
}

/// Serialize Avro data with schema
pub fn serialize_avro(schema: &Schema, value: &Value) -> Result<Vec<u8>> {
    apache_avro::to_avro_datum(schema, value.clone())
        .map_err(|e| SchemaError::SerializationError(e.to_string()))
}

/// Deserialize Avro data with schema
pub fn deserialize_avro(schema: &Schema, data: &[u8]) -> Result<Value> {
    apache_avro::from_avro_datum(schema, &mut &data[..], None)
        .map_err(|e| SchemaError::DeserializationError(e.to_string()))
}

/// Render an Avro value as JSON. Bytes become lowercase hex strings; logical
/// types without a JSON counterpart fall back to their debug form.
pub fn avro_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Int(i) | Value::Date(i) | Value::TimeMillis(i) => Json::from(*i),
        Value::Long(l)
        | Value::TimeMicros(l)
        | Value::TimestampMillis(l)
        | Value::TimestampMicros(l) => Json::from(*l),
        Value::Float(f) => Json::from(*f as f64),
        Value::Double(d) => Json::from(*d),
        Value::Bytes(b) | Value::Fixed(_, b) => Json::String(hex(b)),
        Value::String(s) => Json::String(s.clone()),
        Value::Enum(_, symbol) => Json::String(symbol.clone()),
        Value::Union(_, inner) => avro_to_json(inner),
        Value::Array(items) => Json::Array(items.iter().map(avro_to_json).collect()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        Value::Record(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), avro_to_json(v)))
                .collect(),
        ),
        other => Json::String(format!("{other:?}")),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_SCHEMA: &str = r#"{
        "type": "record",
        "name": "Order",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "item", "type": "string"},
            {"name": "note", "type": ["null", "string"], "default": null}
        ]
    }"#;

    #[test]
    fn test_record_datum() {
        let schema = parse_schema(1, ORDER_SCHEMA).unwrap();
        let value = Value::Record(vec![
            ("id".to_string(), Value::Long(7)),
            ("item".to_string(), Value::String("widget".to_string())),
            ("note".to_string(), Value::Union(0, Box::new(Value::Null))),
        ]);

        let bytes = serialize_avro(&schema, &value).unwrap();
        let decoded = deserialize_avro(&schema, &bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(
            avro_to_json(&decoded),
            serde_json::json!({"id": 7, "item": "widget", "note": null})
        );
    }

    #[test]
    fn test_datum_not_matching_schema() {
        let schema = parse_schema(1, r#"{"type": "string"}"#).unwrap();
        assert!(serialize_avro(&schema, &Value::Long(1)).is_err());
    }

    #[test]
    fn test_invalid_schema() {
        assert!(matches!(
            parse_schema(3, "{not json"),
            Err(SchemaError::InvalidSchema { id: 3, .. })
        ));
    }
}
