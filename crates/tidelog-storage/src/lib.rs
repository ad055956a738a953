//! tidelog Storage Layer
//!
//! This crate emulates a partitioned, offset-addressed log on plain byte
//! storage: local disk, S3-compatible object storage, Azure blob storage, or
//! memory.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐
//! │  Pipelines/Chunking  │   (tidelog-client)
//! └──────────┬───────────┘
//!            │ LogBackend
//!            ▼
//! ┌──────────────────────┐
//! │       FileLog        │ ◄── admin, FileProducer, FileConsumer
//! └──────────┬───────────┘
//!            │ LogLayout / GroupStore
//!            ▼
//! ┌──────────────────────┐
//! │      ByteStore       │ ◄── ObjectByteStore over object_store
//! └──────────┬───────────┘
//!            ▼
//!   disk / S3 / Azure / memory
//! ```
//!
//! ## Main Components
//!
//! - [`ByteStore`]: list/read/write/delete blobs under a prefix
//! - [`LogLayout`]: topic directories, metadata, partition file names, watermarks
//! - [`GroupStore`]: one offset blob per consumer group
//! - [`FileProducer`]: assigns partitions and offsets, writes partition files
//! - [`FileConsumer`]: resolves start positions, scans files, commits offsets
//! - [`FileLog`]: ties them together as a [`tidelog_core::LogBackend`]

pub mod admin;
pub mod codec;
pub mod groups;
pub mod layout;
pub mod object;
pub mod reader;
pub mod store;
pub mod writer;

pub use admin::FileLog;
pub use codec::RecordCodec;
pub use groups::GroupStore;
pub use layout::{LogLayout, PartitionFile, TopicMetadata};
pub use object::{AzureConfig, LocalConfig, ObjectByteStore, S3Config, StoreConfig};
pub use reader::FileConsumer;
pub use store::ByteStore;
pub use writer::FileProducer;
