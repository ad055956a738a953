//! Storage facade.
//!
//! [`Storage`] is the entry point callers hold: one backend, one codec, the
//! backend's configuration. It passes admin calls through and opens typed
//! producers and consumers. Pipelines in [`crate::functional`] and
//! [`crate::zip`] take one or two `Storage`s, which may sit on different
//! backends.
//!
//! ## Usage
//!
//! ```ignore
//! use tidelog_client::{ReadOptions, Storage};
//! use tidelog_core::LogConfig;
//!
//! let storage = Storage::local("/var/lib/tidelog", LogConfig::default())?;
//! storage.create("orders", 3).await?;
//!
//! let mut producer = storage.producer("orders").await?;
//! producer.produce_one(OutMessage::new("hello").with_key("user-1")).await?;
//!
//! let mut consumer = storage.consumer("orders", &ReadOptions::default()).await?;
//! let messages = consumer.consume_batch().await?;
//! ```

use crate::consumer::{Consumer, ReadOptions};
use crate::error::Result;
use crate::producer::Producer;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tidelog_core::{ConsumerGroupState, LogBackend, LogConfig, TopicConfig, Watermark};
use tidelog_schema::{Codec, SchemaResolver, TypeTag};
use tidelog_storage::{FileLog, LocalConfig, StoreConfig};

#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn LogBackend>,
    codec: Arc<Codec>,
}

impl Storage {
    pub fn new(backend: Arc<dyn LogBackend>) -> Self {
        Self {
            backend,
            codec: Arc::new(Codec::new()),
        }
    }

    /// File-emulated log under a local directory.
    pub fn local(root: impl Into<PathBuf>, config: LogConfig) -> Result<Self> {
        let local = LocalConfig { root: root.into() };
        Ok(Self::new(Arc::new(FileLog::local(&local, config)?)))
    }

    /// File-emulated log held in memory.
    pub fn memory(config: LogConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(FileLog::memory(config)?)))
    }

    pub fn from_config(store: &StoreConfig, config: LogConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(FileLog::from_config(store, config)?)))
    }

    /// Resolve schema ids of framed payloads through `resolver`.
    pub fn with_schema_resolver(mut self, resolver: Arc<dyn SchemaResolver>) -> Self {
        self.codec = Arc::new(Codec::with_resolver(resolver));
        self
    }

    pub fn backend(&self) -> &Arc<dyn LogBackend> {
        &self.backend
    }

    pub fn config(&self) -> &LogConfig {
        self.backend.config()
    }

    /// Default key and value type tags from the configuration.
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for an unknown tag name.
    pub fn default_types(&self) -> Result<(TypeTag, TypeTag)> {
        let config = self.config();
        Ok((
            config.key_type.parse::<TypeTag>()?,
            config.value_type.parse::<TypeTag>()?,
        ))
    }

    pub async fn producer(&self, topic: &str) -> Result<Producer> {
        let (key_type, value_type) = self.default_types()?;
        self.producer_with_types(topic, key_type, value_type).await
    }

    pub async fn producer_with_types(
        &self,
        topic: &str,
        key_type: TypeTag,
        value_type: TypeTag,
    ) -> Result<Producer> {
        Producer::open(
            self.backend.as_ref(),
            self.codec.clone(),
            topic,
            key_type,
            value_type,
        )
        .await
    }

    pub async fn consumer(&self, topic: &str, options: &ReadOptions) -> Result<Consumer> {
        let commit_after_processing = self.config().commit_after_processing;
        self.open_consumer(topic, options, commit_after_processing)
            .await
    }

    /// Consumer for a pipeline source. Reads never commit on their own; when
    /// the group commits at all, it does so through [`Consumer::processed`]
    /// once a batch's output is flushed.
    pub(crate) async fn pipeline_consumer(
        &self,
        topic: &str,
        options: &ReadOptions,
    ) -> Result<Consumer> {
        let config = self.config();
        let commits = options.auto_commit.unwrap_or(config.enable_auto_commit)
            || config.commit_after_processing;
        let options = options.clone().with_auto_commit(false);
        self.open_consumer(topic, &options, commits).await
    }

    async fn open_consumer(
        &self,
        topic: &str,
        options: &ReadOptions,
        commit_after_processing: bool,
    ) -> Result<Consumer> {
        let (default_key, default_value) = self.default_types()?;
        let types = (
            options.key_type.unwrap_or(default_key),
            options.value_type.unwrap_or(default_value),
        );
        Consumer::open(
            self.backend.as_ref(),
            self.codec.clone(),
            topic,
            options,
            types,
            commit_after_processing,
        )
        .await
    }

    // Admin pass-through.

    pub async fn create(&self, topic: &str, partitions: u32) -> Result<()> {
        self.create_with_config(topic, partitions, TopicConfig::new())
            .await
    }

    pub async fn create_with_config(
        &self,
        topic: &str,
        partitions: u32,
        config: TopicConfig,
    ) -> Result<()> {
        Ok(self.backend.create_topic(topic, partitions, config).await?)
    }

    /// Delete every topic matching `pattern`; returns the deleted names.
    pub async fn delete(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.backend.delete_topics(pattern).await?)
    }

    pub async fn recreate(&self, topic: &str) -> Result<()> {
        Ok(self.backend.recreate(topic).await?)
    }

    pub async fn exists(&self, topic: &str) -> Result<bool> {
        Ok(self.backend.exists(topic).await?)
    }

    pub async fn topics(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.backend.list_topics(pattern).await?)
    }

    pub async fn partitions(&self, pattern: &str) -> Result<BTreeMap<String, u32>> {
        Ok(self.backend.partitions(pattern).await?)
    }

    pub async fn topic_config(&self, topic: &str) -> Result<TopicConfig> {
        Ok(self.backend.topic_config(topic).await?)
    }

    pub async fn watermarks(&self, topic: &str) -> Result<BTreeMap<u32, Watermark>> {
        Ok(self.backend.watermarks(topic).await?)
    }

    /// Records per partition of every matching topic, and their total.
    pub async fn size(&self, pattern: &str) -> Result<(BTreeMap<String, BTreeMap<u32, u64>>, u64)> {
        let sizes = self.backend.size(pattern).await?;
        let total = sizes.values().flat_map(|p| p.values()).sum();
        Ok((sizes, total))
    }

    pub async fn offsets_for_times(
        &self,
        topic: &str,
        times: &BTreeMap<u32, i64>,
    ) -> Result<BTreeMap<u32, u64>> {
        Ok(self.backend.offsets_for_times(topic, times).await?)
    }

    pub async fn groups(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.backend.list_groups(pattern).await?)
    }

    pub async fn groups_for_topic(&self, pattern: &str, topic: &str) -> Result<Vec<String>> {
        Ok(self.backend.groups_for_topic(pattern, topic).await?)
    }

    pub async fn describe_group(&self, group: &str) -> Result<Option<ConsumerGroupState>> {
        Ok(self.backend.describe_group(group).await?)
    }

    pub async fn delete_group(&self, group: &str) -> Result<()> {
        Ok(self.backend.delete_group(group).await?)
    }

    pub async fn lags(&self, group: &str, topic: &str) -> Result<BTreeMap<u32, u64>> {
        Ok(self.backend.lags(group, topic).await?)
    }
}
