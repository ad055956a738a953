//! File-emulated log backend.
//!
//! [`FileLog`] implements the full backend contract over any [`ByteStore`]:
//! topic and group administration here, producing in [`crate::writer`] and
//! consuming in [`crate::reader`].
//!
//! ## Usage
//!
//! ```ignore
//! use tidelog_core::{LogAdmin, LogConfig};
//! use tidelog_storage::{FileLog, LocalConfig};
//!
//! let log = FileLog::local(&LocalConfig { root: "/var/lib/tidelog".into() }, LogConfig::default())?;
//! log.create_topic("orders", 3, Default::default()).await?;
//! let watermarks = log.watermarks("orders").await?;
//! ```

use crate::codec::RecordCodec;
use crate::groups::GroupStore;
use crate::layout::{topic_dir, LogLayout, TopicMetadata};
use crate::object::{AzureConfig, LocalConfig, ObjectByteStore, S3Config, StoreConfig};
use crate::reader::FileConsumer;
use crate::store::ByteStore;
use crate::writer::FileProducer;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tidelog_core::{
    validate_name, ConsumerGroupState, ConsumerSpec, Error, LogAdmin, LogBackend, LogConfig,
    LogConsumer, LogProducer, Result, TopicConfig, Watermark,
};

pub struct FileLog {
    layout: LogLayout,
    groups: GroupStore,
    config: LogConfig,
}

impl FileLog {
    /// Build a log over `store`.
    ///
    /// # Errors
    ///
    /// `Configuration` if `config` fails validation.
    pub fn new(store: Arc<dyn ByteStore>, config: LogConfig) -> Result<Self> {
        config.validate()?;
        let codec = RecordCodec::new(config.message_separator.clone());
        Ok(Self {
            layout: LogLayout::new(store.clone(), codec),
            groups: GroupStore::new(store),
            config,
        })
    }

    pub fn from_config(store: &StoreConfig, config: LogConfig) -> Result<Self> {
        Self::new(Arc::new(ObjectByteStore::from_config(store)?), config)
    }

    pub fn local(local: &LocalConfig, config: LogConfig) -> Result<Self> {
        Self::new(Arc::new(ObjectByteStore::local(local)?), config)
    }

    pub fn s3(s3: &S3Config, config: LogConfig) -> Result<Self> {
        Self::new(Arc::new(ObjectByteStore::s3(s3)?), config)
    }

    pub fn azure(azure: &AzureConfig, config: LogConfig) -> Result<Self> {
        Self::new(Arc::new(ObjectByteStore::azure(azure)?), config)
    }

    pub fn memory(config: LogConfig) -> Result<Self> {
        Self::new(Arc::new(ObjectByteStore::memory()), config)
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }
}

#[async_trait]
impl LogAdmin for FileLog {
    async fn create_topic(&self, topic: &str, partitions: u32, config: TopicConfig) -> Result<()> {
        validate_name(topic)?;
        if partitions == 0 {
            return Err(Error::Configuration(format!(
                "topic '{topic}' needs at least one partition"
            )));
        }

        self.layout
            .write_metadata(&TopicMetadata {
                topic: topic.to_string(),
                partitions,
                config,
            })
            .await?;

        tracing::info!(
            store = self.layout.store().kind(),
            topic = %topic,
            partitions,
            "Created topic"
        );
        Ok(())
    }

    async fn delete_topics(&self, pattern: &str) -> Result<Vec<String>> {
        let topics = self.layout.topics(pattern).await?;
        for topic in &topics {
            self.layout.store().delete_dir(&topic_dir(topic)).await?;
            tracing::info!(store = self.layout.store().kind(), topic = %topic, "Deleted topic");
        }
        Ok(topics)
    }

    async fn list_topics(&self, pattern: &str) -> Result<Vec<String>> {
        self.layout.topics(pattern).await
    }

    async fn partitions(&self, pattern: &str) -> Result<BTreeMap<String, u32>> {
        let mut partitions = BTreeMap::new();
        for topic in self.layout.topics(pattern).await? {
            let count = self.layout.partition_count(&topic).await?;
            partitions.insert(topic, count);
        }
        Ok(partitions)
    }

    async fn topic_config(&self, topic: &str) -> Result<TopicConfig> {
        Ok(self
            .layout
            .read_metadata(topic)
            .await?
            .map(|m| m.config)
            .unwrap_or_default())
    }

    async fn watermarks(&self, topic: &str) -> Result<BTreeMap<u32, Watermark>> {
        self.layout.watermarks(topic).await
    }

    async fn offsets_for_times(
        &self,
        topic: &str,
        times: &BTreeMap<u32, i64>,
    ) -> Result<BTreeMap<u32, u64>> {
        let watermarks = self.layout.watermarks(topic).await?;
        let files = self.layout.partition_files(topic).await?;
        let mut offsets = BTreeMap::new();

        for (&partition, &millis) in times {
            let high = watermarks.get(&partition).map(|wm| wm.high).unwrap_or(0);
            let file = files
                .iter()
                .find(|f| f.partition == partition && f.end_ts >= millis);

            let offset = match file {
                None => high,
                Some(file) => self
                    .layout
                    .read_file(topic, file)
                    .await?
                    .iter()
                    .find(|r| r.timestamp.millis >= millis)
                    .map(|r| r.offset)
                    .unwrap_or(file.start_offset),
            };
            offsets.insert(partition, offset);
        }
        Ok(offsets)
    }

    async fn list_groups(&self, pattern: &str) -> Result<Vec<String>> {
        self.groups.list(pattern).await
    }

    async fn describe_group(&self, group: &str) -> Result<Option<ConsumerGroupState>> {
        self.groups.get(group).await
    }

    async fn delete_group(&self, group: &str) -> Result<()> {
        self.groups.delete(group).await?;
        tracing::info!(group = %group, "Deleted consumer group");
        Ok(())
    }

    async fn exists(&self, topic: &str) -> Result<bool> {
        self.layout.topic_exists(topic).await
    }
}

#[async_trait]
impl LogBackend for FileLog {
    fn kind(&self) -> &str {
        self.layout.store().kind()
    }

    fn config(&self) -> &LogConfig {
        &self.config
    }

    async fn open_producer(&self, topic: &str) -> Result<Box<dyn LogProducer>> {
        validate_name(topic)?;
        Ok(Box::new(FileProducer::new(self.layout.clone(), topic)))
    }

    async fn open_consumer(&self, spec: ConsumerSpec) -> Result<Box<dyn LogConsumer>> {
        let consumer =
            FileConsumer::open(self.layout.clone(), self.groups.clone(), &self.config, spec)
                .await?;
        Ok(Box::new(consumer))
    }
}
