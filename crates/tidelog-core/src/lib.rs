//! tidelog Core
//!
//! Shared building blocks for every tidelog crate:
//!
//! - **Record model**: [`Record`], [`ProducerRecord`], [`Header`], [`Timestamp`]
//! - **Configuration**: [`LogConfig`] and the [`OffsetReset`] policy
//! - **Errors**: the [`Error`] taxonomy returned by all backends
//! - **Backend contract**: [`LogAdmin`], [`LogProducer`], [`LogConsumer`] and
//!   [`LogBackend`], implemented once per physical backend
//! - **Naming**: topic/group name validation and glob matching
//!
//! The pipeline and chunking layers in `tidelog-client` only ever talk to the
//! traits defined here, so a file-emulated log and a real broker can be swapped
//! without touching caller code.

pub mod backend;
pub mod config;
pub mod error;
pub mod naming;
pub mod record;

pub use backend::{ConsumerSpec, LogAdmin, LogBackend, LogConsumer, LogProducer};
pub use config::{LogConfig, OffsetReset};
pub use error::{Error, Result};
pub use naming::{glob_match, validate_name};
pub use record::{
    now_ms, partition_for_key, ConsumerGroupState, GroupLifecycle, Header, ProducerRecord,
    Record, RecordPosition, Timestamp, TimestampType, TopicConfig, Watermark,
};
