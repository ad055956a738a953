//! tidelog Schema
//!
//! Converts between the raw key/value bytes stored in a log and typed
//! payloads. A [`TypeTag`] picks the codec; [`Codec`] applies it.
//!
//! ## Wire Format for Schema-Framed Types
//!
//! ```text
//! [Magic Byte (0x00)][Schema ID (4 bytes, big-endian)][Data...]
//! ```
//!
//! Protobuf data additionally starts with a message-index array.
//!
//! ## Example
//!
//! ```ignore
//! use tidelog_schema::{Codec, Payload, TypeTag};
//!
//! let codec = Codec::new();
//! let bytes = codec.encode(TypeTag::Json, &Payload::from(serde_json::json!({"id": 1}))).await?;
//! let payload = codec.decode(TypeTag::Json, bytes).await?;
//! ```

pub mod avro;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod protobuf;
pub mod registry;
pub mod types;
pub mod varint;

pub use dispatch::Codec;
pub use error::{Result, SchemaError};
pub use framing::{frame, frame_header, unframe, FRAME_HEADER_LEN, MAGIC_BYTE};
pub use protobuf::{ProtoDescriptor, ProtoField, ProtoMessage, ProtoValue};
pub use registry::{
    CachedSchemaResolver, InMemorySchemaRegistry, SchemaDefinition, SchemaFormat, SchemaResolver,
};
pub use types::{Payload, TypeTag};
