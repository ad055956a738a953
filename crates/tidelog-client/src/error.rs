//! Error types for tidelog client operations.
//!
//! [`ClientError`] wraps the storage taxonomy ([`tidelog_core::Error`]) and
//! codec failures ([`SchemaError`]), and adds what only the client layer can
//! know: malformed chunk sequences, failures of caller-supplied functions,
//! and the position of the record a pipeline was processing when it failed.
//!
//! ## Examples
//!
//! ```ignore
//! use tidelog_client::{functional, ClientError};
//!
//! match functional::foreach(&storage, "orders", &options, handle).await {
//!     Ok(count) => println!("processed {count}"),
//!     Err(ClientError::Pipeline { topic, partition, offset, source }) => {
//!         eprintln!("{topic}/{partition}@{offset}: {source}");
//!     }
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! ```

use thiserror::Error;
use tidelog_schema::SchemaError;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Storage, admin, or configuration failure from the backend.
    #[error(transparent)]
    Core(#[from] tidelog_core::Error),

    /// Encoding or decoding a key or value failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A record carried chunking headers that cannot be reassembled.
    #[error("Invalid chunk at {topic}/{partition}@{offset}: {reason}")]
    InvalidChunk {
        topic: String,
        partition: u32,
        offset: u64,
        reason: String,
    },

    /// A caller-supplied function failed.
    #[error("Transform failed: {0}")]
    Transform(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A pipeline aborted while processing the record at this position.
    #[error("Pipeline failed at {topic}/{partition}@{offset}: {source}")]
    Pipeline {
        topic: String,
        partition: u32,
        offset: u64,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Wrap any error raised by a caller's function.
    pub fn transform(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ClientError::Transform(err.into())
    }

    /// Attach the position of the record being processed.
    pub fn at(self, topic: impl Into<String>, partition: u32, offset: u64) -> Self {
        match self {
            // Keep the innermost position.
            err @ ClientError::Pipeline { .. } => err,
            err => ClientError::Pipeline {
                topic: topic.into(),
                partition,
                offset,
                source: Box::new(err),
            },
        }
    }

    /// The error without pipeline position context.
    pub fn root(&self) -> &ClientError {
        match self {
            ClientError::Pipeline { source, .. } => source.root(),
            err => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_context() {
        let err = ClientError::transform("boom").at("orders", 2, 17);
        assert_eq!(
            err.to_string(),
            "Pipeline failed at orders/2@17: Transform failed: boom"
        );
        assert!(matches!(err.root(), ClientError::Transform(_)));

        let again = err.at("other", 0, 0);
        assert!(again.to_string().contains("orders/2@17"));
    }

    #[test]
    fn test_core_errors_convert() {
        let err: ClientError = tidelog_core::Error::not_found("topic 'x'").into();
        assert!(matches!(
            err,
            ClientError::Core(tidelog_core::Error::NotFound { .. })
        ));
    }
}
