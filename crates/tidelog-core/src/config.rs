//! Log Configuration
//!
//! This module defines the per-storage options shared by every backend.
//!
//! ## LogConfig
//!
//! - **chunk_size_bytes**: split record values larger than this (default: disabled)
//! - **consume_batch_size**: records pulled per consume call (default: 1000)
//! - **produce_batch_size**: records buffered before a pipeline flush (default: 1000)
//! - **auto_offset_reset**: `earliest` or `latest` (default: earliest)
//! - **enable_auto_commit**: commit after every consumed batch (default: true)
//! - **commit_after_processing**: commit only once a batch was processed (default: false)
//! - **key_type / value_type**: default type tags (default: `bytes`)
//! - **consumer_group_prefix**: prefix for generated group names (default: `tidelog-`)
//! - **message_separator**: terminator of each stored record, control
//!   characters only (default: `\n`)
//! - **chunk_buffer_max_pending**: incomplete chunk sequences kept in memory (default: 1024)
//!
//! The struct is immutable once handed to a backend. The `with_*` helpers
//! return a modified copy.
//!
//! ## Usage
//!
//! ```ignore
//! use tidelog_core::{LogConfig, OffsetReset};
//!
//! let config = LogConfig::default()
//!     .with_chunk_size(Some(1024 * 1024))
//!     .with_auto_offset_reset(OffsetReset::Latest);
//! config.validate()?;
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a consumer starts when it has neither explicit nor committed offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OffsetReset {
    /// Start at the low watermark.
    #[default]
    Earliest,
    /// Start at the high watermark (only new records).
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OffsetReset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(Error::OffsetPolicy(other.to_string())),
        }
    }
}

impl TryFrom<String> for OffsetReset {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<OffsetReset> for String {
    fn from(value: OffsetReset) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum value size before a record is chunked. `None` disables chunking.
    #[serde(default)]
    pub chunk_size_bytes: Option<usize>,

    /// Records pulled per consume call (default: 1000)
    #[serde(default = "default_batch_size")]
    pub consume_batch_size: usize,

    /// Records buffered by pipelines before writing to the target (default: 1000)
    #[serde(default = "default_batch_size")]
    pub produce_batch_size: usize,

    #[serde(default)]
    pub auto_offset_reset: OffsetReset,

    /// Commit positions after every consumed batch (default: true)
    #[serde(default = "default_true")]
    pub enable_auto_commit: bool,

    /// Commit positions only after the batch was processed and any output
    /// flushed (default: false). Takes precedence over auto-commit in pipelines.
    #[serde(default)]
    pub commit_after_processing: bool,

    /// Default key type tag (default: "bytes")
    #[serde(default = "default_type_tag")]
    pub key_type: String,

    /// Default value type tag (default: "bytes")
    #[serde(default = "default_type_tag")]
    pub value_type: String,

    /// Prefix of generated consumer group names (default: "tidelog-")
    #[serde(default = "default_group_prefix")]
    pub consumer_group_prefix: String,

    /// Terminator written after every stored record (default: "\n")
    #[serde(default = "default_separator")]
    pub message_separator: String,

    /// Maximum number of incomplete chunk sequences buffered by a reader
    /// before the oldest is dropped (default: 1024)
    #[serde(default = "default_max_pending")]
    pub chunk_buffer_max_pending: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: None,
            consume_batch_size: default_batch_size(),
            produce_batch_size: default_batch_size(),
            auto_offset_reset: OffsetReset::default(),
            enable_auto_commit: default_true(),
            commit_after_processing: false,
            key_type: default_type_tag(),
            value_type: default_type_tag(),
            consumer_group_prefix: default_group_prefix(),
            message_separator: default_separator(),
            chunk_buffer_max_pending: default_max_pending(),
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_type_tag() -> String {
    "bytes".to_string()
}

fn default_group_prefix() -> String {
    "tidelog-".to_string()
}

fn default_separator() -> String {
    "\n".to_string()
}

fn default_max_pending() -> usize {
    1024
}

impl LogConfig {
    /// Check the invariants a backend relies on.
    ///
    /// # Errors
    ///
    /// `Configuration` for a zero chunk size, zero batch sizes, an empty
    /// separator or one with printable characters, or a zero pending-chunk
    /// limit.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == Some(0) {
            return Err(Error::Configuration(
                "chunk_size_bytes must be greater than zero (use None to disable chunking)".into(),
            ));
        }
        if self.consume_batch_size == 0 {
            return Err(Error::Configuration(
                "consume_batch_size must be greater than zero".into(),
            ));
        }
        if self.produce_batch_size == 0 {
            return Err(Error::Configuration(
                "produce_batch_size must be greater than zero".into(),
            ));
        }
        if self.message_separator.is_empty() {
            return Err(Error::Configuration(
                "message_separator must not be empty".into(),
            ));
        }
        // Compact JSON escapes every control character, so only those can
        // never occur inside a stored record.
        if !self.message_separator.chars().all(|c| c < ' ') {
            return Err(Error::Configuration(format!(
                "message_separator {:?} may occur inside a stored record; use control characters only",
                self.message_separator
            )));
        }
        if self.chunk_buffer_max_pending == 0 {
            return Err(Error::Configuration(
                "chunk_buffer_max_pending must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn with_chunk_size(mut self, chunk_size_bytes: Option<usize>) -> Self {
        self.chunk_size_bytes = chunk_size_bytes;
        self
    }

    pub fn with_consume_batch_size(mut self, size: usize) -> Self {
        self.consume_batch_size = size;
        self
    }

    pub fn with_produce_batch_size(mut self, size: usize) -> Self {
        self.produce_batch_size = size;
        self
    }

    pub fn with_auto_offset_reset(mut self, reset: OffsetReset) -> Self {
        self.auto_offset_reset = reset;
        self
    }

    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.enable_auto_commit = enabled;
        self
    }

    pub fn with_commit_after_processing(mut self, enabled: bool) -> Self {
        self.commit_after_processing = enabled;
        self
    }

    pub fn with_types(mut self, key_type: impl Into<String>, value_type: impl Into<String>) -> Self {
        self.key_type = key_type.into();
        self.value_type = value_type.into();
        self
    }

    pub fn with_consumer_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.consumer_group_prefix = prefix.into();
        self
    }

    pub fn with_message_separator(mut self, separator: impl Into<String>) -> Self {
        self.message_separator = separator.into();
        self
    }

    pub fn with_chunk_buffer_max_pending(mut self, max_pending: usize) -> Self {
        self.chunk_buffer_max_pending = max_pending;
        self
    }
}
