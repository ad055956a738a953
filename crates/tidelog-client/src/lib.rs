//! tidelog Client
//!
//! Typed access to a tidelog backend and the pipelines built on it.
//!
//! ## Architecture
//!
//! ```text
//! caller fn ◄── functional / zip pipelines
//!                 │                │
//!              Consumer         Producer
//!                 │                │
//!         decode (Codec)     encode (Codec)
//!                 │                │
//!          Dechunker          chunk_record
//!                 │                │
//!            LogConsumer      LogProducer      (any LogBackend)
//! ```
//!
//! ## Main Components
//!
//! - [`Storage`]: one backend plus codec; admin pass-through, opens
//!   producers and consumers
//! - [`Producer`] / [`OutMessage`]: encode, chunk, write
//! - [`Consumer`] / [`Message`] / [`ReadOptions`]: read, reassemble, decode
//! - [`chunking`]: value splitting and reassembly
//! - [`functional`]: `foldl`, `map`, `filter`, `flatmap`, `foreach`, the
//!   `_to` variants, `cp`, `head`, `cat`, `grep`, `wc`
//! - [`zip`]: `zip_foldl`, `zip_foldl_to`, `diff`
//!
//! ## Example
//!
//! ```ignore
//! use tidelog_client::{functional, OutMessage, ReadOptions, Storage};
//! use tidelog_core::LogConfig;
//!
//! let storage = Storage::memory(LogConfig::default().with_types("str", "str"))?;
//! storage.create("words", 1).await?;
//! storage
//!     .producer("words")
//!     .await?
//!     .produce(vec![OutMessage::new("hello world"), OutMessage::new("bye")])
//!     .await?;
//!
//! let (messages, words, bytes) = functional::wc(&storage, "words", &ReadOptions::default()).await?;
//! ```

pub mod chunking;
pub mod consumer;
pub mod error;
pub mod functional;
pub mod producer;
pub mod storage;
pub mod zip;

pub use chunking::{chunk_record, Dechunker};
pub use consumer::{Consumer, Message, ReadOptions};
pub use error::{ClientError, Result};
pub use producer::{OutMessage, Producer};
pub use storage::Storage;
pub use zip::{ZipCounts, ZipSource};
