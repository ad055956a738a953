//! Serialization dispatch.
//!
//! [`Codec`] maps a [`TypeTag`] to a symmetric encoder/decoder pair applied
//! independently to keys and values. Schema-framed tags resolve the schema
//! id through a [`CachedSchemaResolver`] and keep the parsed schema (Avro
//! `Schema`, protobuf field names) cached per id.

use crate::avro::{deserialize_avro, parse_schema, serialize_avro};
use crate::error::{Result, SchemaError};
use crate::framing::{frame, unframe};
use crate::protobuf::{
    decode_message, encode_message, skip_message_indexes, write_message_index, ProtoDescriptor,
};
use crate::registry::{CachedSchemaResolver, SchemaFormat, SchemaResolver};
use crate::types::{Payload, TypeTag};
use bytes::Bytes;
use moka::future::Cache;
use std::sync::Arc;

pub struct Codec {
    resolver: Option<Arc<CachedSchemaResolver>>,
    avro_schemas: Cache<i32, Arc<apache_avro::Schema>>,
    proto_descriptors: Cache<i32, Arc<ProtoDescriptor>>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// A codec without schema lookup. Framed tags fail with `NoResolver`.
    pub fn new() -> Self {
        Self {
            resolver: None,
            avro_schemas: Cache::builder().max_capacity(1_000).build(),
            proto_descriptors: Cache::builder().max_capacity(1_000).build(),
        }
    }

    pub fn with_resolver(resolver: Arc<dyn SchemaResolver>) -> Self {
        Self {
            resolver: Some(Arc::new(CachedSchemaResolver::new(resolver))),
            ..Self::new()
        }
    }

    pub async fn encode(&self, tag: TypeTag, payload: &Payload) -> Result<Bytes> {
        match (tag, payload) {
            (TypeTag::Bytes, Payload::Bytes(b)) => Ok(b.clone()),
            // Text and JSON may also be written as raw bytes.
            (TypeTag::Bytes, Payload::Str(s)) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            (TypeTag::Str, Payload::Str(s)) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            (TypeTag::Json, Payload::Json(v)) => Ok(Bytes::from(serde_json::to_vec(v)?)),
            (TypeTag::Avro, Payload::Avro { schema_id, value }) => {
                let schema = self.avro_schema(*schema_id).await?;
                Ok(frame(*schema_id, &serialize_avro(&schema, value)?))
            }
            (TypeTag::JsonSchema, Payload::JsonSchema { schema_id, value }) => {
                self.expect_format(*schema_id, SchemaFormat::Json).await?;
                Ok(frame(*schema_id, &serde_json::to_vec(value)?))
            }
            (TypeTag::Protobuf, Payload::Protobuf { schema_id, message }) => {
                self.expect_format(*schema_id, SchemaFormat::Protobuf).await?;
                let mut body = Vec::new();
                write_message_index(&mut body);
                body.extend_from_slice(&encode_message(message));
                Ok(frame(*schema_id, &body))
            }
            (tag, payload) => Err(SchemaError::TypeMismatch {
                expected: tag.as_str(),
                found: payload.type_tag().as_str(),
            }),
        }
    }

    pub async fn decode(&self, tag: TypeTag, data: Bytes) -> Result<Payload> {
        match tag {
            TypeTag::Bytes => Ok(Payload::Bytes(data)),
            TypeTag::Str => String::from_utf8(data.to_vec())
                .map(Payload::Str)
                .map_err(|e| SchemaError::DeserializationError(e.to_string())),
            TypeTag::Json => Ok(Payload::Json(serde_json::from_slice(&data)?)),
            TypeTag::Avro => {
                let (schema_id, body) = unframe(&data)?;
                let schema = self.avro_schema(schema_id).await?;
                Ok(Payload::Avro {
                    schema_id,
                    value: deserialize_avro(&schema, body)?,
                })
            }
            TypeTag::JsonSchema => {
                let (schema_id, body) = unframe(&data)?;
                Ok(Payload::JsonSchema {
                    schema_id,
                    value: serde_json::from_slice(body)?,
                })
            }
            TypeTag::Protobuf => {
                let (schema_id, mut body) = unframe(&data)?;
                skip_message_indexes(&mut body)?;
                let descriptor = self.proto_descriptor(schema_id).await?;
                Ok(Payload::Protobuf {
                    schema_id,
                    message: decode_message(body, Some(&descriptor))?,
                })
            }
        }
    }

    async fn resolve(&self, schema_id: i32) -> Result<Arc<crate::registry::SchemaDefinition>> {
        match self.resolver {
            Some(ref resolver) => resolver.get(schema_id).await,
            None => Err(SchemaError::NoResolver(schema_id)),
        }
    }

    async fn expect_format(&self, schema_id: i32, format: SchemaFormat) -> Result<()> {
        let definition = self.resolve(schema_id).await?;
        if definition.schema_type != format {
            return Err(SchemaError::InvalidSchema {
                id: schema_id,
                message: format!(
                    "expected a {} schema, registry has {}",
                    format.as_str(),
                    definition.schema_type.as_str()
                ),
            });
        }
        Ok(())
    }

    async fn avro_schema(&self, schema_id: i32) -> Result<Arc<apache_avro::Schema>> {
        if let Some(schema) = self.avro_schemas.get(&schema_id).await {
            return Ok(schema);
        }
        self.expect_format(schema_id, SchemaFormat::Avro).await?;
        let definition = self.resolve(schema_id).await?;
        let schema = Arc::new(parse_schema(schema_id, &definition.schema)?);
        self.avro_schemas.insert(schema_id, schema.clone()).await;
        Ok(schema)
    }

    async fn proto_descriptor(&self, schema_id: i32) -> Result<Arc<ProtoDescriptor>> {
        if let Some(descriptor) = self.proto_descriptors.get(&schema_id).await {
            return Ok(descriptor);
        }
        self.expect_format(schema_id, SchemaFormat::Protobuf).await?;
        let definition = self.resolve(schema_id).await?;
        let descriptor = Arc::new(ProtoDescriptor::parse(schema_id, &definition.schema)?);
        self.proto_descriptors
            .insert(schema_id, descriptor.clone())
            .await;
        Ok(descriptor)
    }
}
