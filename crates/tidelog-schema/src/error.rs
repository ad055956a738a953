//! Schema Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Schema not found: id {0}")]
    SchemaNotFound(i32),

    #[error("No schema resolver configured for schema id {0}")]
    NoResolver(i32),

    #[error("Invalid schema {id}: {message}")]
    InvalidSchema { id: i32, message: String },

    #[error("Payload does not match type '{expected}': got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Schema registry error: {0}")]
    Registry(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
