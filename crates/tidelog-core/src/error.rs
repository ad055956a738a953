//! Error Types for tidelog
//!
//! Every backend operation returns [`Result<T>`], aliased to
//! `Result<T, Error>`. All variants are fatal to the current operation; the
//! core never retries on its own.
//!
//! ## Error Categories
//!
//! ### Configuration
//! - `Configuration`: missing mandatory section, zero chunk size, chunking on a
//!   backend that cannot store arbitrary bytes
//! - `OffsetPolicy`: `auto_offset_reset` other than `earliest`/`latest`
//!
//! Unknown key/value type tags are a serialization concern and surface as
//! `tidelog_schema::SchemaError::UnsupportedType`.
//!
//! ### Lookup
//! - `NotFound`: nonexistent blob, topic, or partition file
//! - `InvalidName`: topic/group name outside the legal character set
//!
//! ### Storage
//! - `ObjectStore`: underlying byte-store failure, propagated verbatim
//! - `Codec`: a partition file or metadata blob could not be parsed
//! - `OffsetConflict`: another writer already claimed the offsets we computed

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid offset reset policy: {0} (expected 'earliest' or 'latest')")]
    OffsetPolicy(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Codec error for {path}: {message}")]
    Codec { path: String, message: String },

    #[error(
        "Offset conflict on {topic}/{partition}: offset {offset} was already written by another writer"
    )]
    OffsetConflict {
        topic: String,
        partition: u32,
        offset: u64,
    },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with a formatted description.
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// Returns true if this error means the thing looked up does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::ObjectStore(object_store::Error::NotFound { .. })
        )
    }
}
