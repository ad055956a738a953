//! Object-Store Backed Byte Store
//!
//! [`ObjectByteStore`] implements [`ByteStore`] on top of the `object_store`
//! crate, which gives one code path for every physical backend:
//!
//! | Backend | Builder | Config |
//! |---------|---------|--------|
//! | Local disk | `LocalFileSystem::new_with_prefix` | [`LocalConfig`] |
//! | S3 / MinIO | `AmazonS3Builder` | [`S3Config`] |
//! | Azure Blob | `MicrosoftAzureBuilder` | [`AzureConfig`] |
//! | In-memory | `InMemory` | none |
//!
//! ## Usage
//!
//! ```ignore
//! use tidelog_storage::{ObjectByteStore, S3Config};
//!
//! // Development config (MinIO)
//! let store = ObjectByteStore::s3(&S3Config {
//!     bucket: "tidelog".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     allow_http: true,
//!     ..Default::default()
//! })?;
//! ```

use crate::store::{join, ByteStore};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tidelog_core::{Error, Result};

/// Local directory that holds the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// Key prefix inside the bucket
    #[serde(default)]
    pub prefix: Option<String>,

    /// S3 region
    #[serde(default)]
    pub region: Option<String>,

    /// Optional S3 endpoint (for MinIO/localstack)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Permit plain-HTTP endpoints (default: false)
    #[serde(default)]
    pub allow_http: bool,
}

impl S3Config {
    /// Read `TIDELOG_S3_BUCKET`, `TIDELOG_S3_PREFIX`, `TIDELOG_S3_REGION` and
    /// `TIDELOG_S3_ENDPOINT`. Credentials are left to the AWS defaults.
    ///
    /// # Errors
    ///
    /// `Configuration` if `TIDELOG_S3_BUCKET` is not set.
    pub fn from_env() -> Result<Self> {
        let bucket = std::env::var("TIDELOG_S3_BUCKET")
            .map_err(|_| Error::Configuration("TIDELOG_S3_BUCKET is not set".into()))?;
        let endpoint = std::env::var("TIDELOG_S3_ENDPOINT").ok();
        Ok(Self {
            bucket,
            prefix: std::env::var("TIDELOG_S3_PREFIX").ok(),
            region: std::env::var("TIDELOG_S3_REGION").ok(),
            allow_http: endpoint
                .as_deref()
                .is_some_and(|e| e.starts_with("http://")),
            endpoint,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureConfig {
    pub container: String,

    /// Storage account name
    #[serde(default)]
    pub account: Option<String>,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub prefix: Option<String>,
}

impl AzureConfig {
    /// Read `TIDELOG_AZURE_CONTAINER`, `TIDELOG_AZURE_ACCOUNT`,
    /// `TIDELOG_AZURE_ACCESS_KEY` and `TIDELOG_AZURE_PREFIX`.
    ///
    /// # Errors
    ///
    /// `Configuration` if `TIDELOG_AZURE_CONTAINER` is not set.
    pub fn from_env() -> Result<Self> {
        let container = std::env::var("TIDELOG_AZURE_CONTAINER")
            .map_err(|_| Error::Configuration("TIDELOG_AZURE_CONTAINER is not set".into()))?;
        Ok(Self {
            container,
            account: std::env::var("TIDELOG_AZURE_ACCOUNT").ok(),
            access_key: std::env::var("TIDELOG_AZURE_ACCESS_KEY").ok(),
            prefix: std::env::var("TIDELOG_AZURE_PREFIX").ok(),
        })
    }
}

/// Which physical store to open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Local(LocalConfig),
    S3(S3Config),
    Azure(AzureConfig),
    Memory,
}

/// [`ByteStore`] over any `object_store` implementation.
pub struct ObjectByteStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    kind: &'static str,
    // Set for local disk, where deleting every file leaves empty directories
    // that would otherwise keep showing up in listings.
    local_root: Option<PathBuf>,
}

impl ObjectByteStore {
    /// Wrap an already-built object store. All paths are placed under `prefix`.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, kind: &'static str) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
            kind,
            local_root: None,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::Local(local) => Self::local(local),
            StoreConfig::S3(s3) => Self::s3(s3),
            StoreConfig::Azure(azure) => Self::azure(azure),
            StoreConfig::Memory => Ok(Self::memory()),
        }
    }

    pub fn local(config: &LocalConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root).map_err(|e| {
            Error::Configuration(format!(
                "cannot create log directory {}: {e}",
                config.root.display()
            ))
        })?;
        let store = LocalFileSystem::new_with_prefix(&config.root)?;
        Ok(Self {
            local_root: Some(config.root.clone()),
            ..Self::new(Arc::new(store), "", "local")
        })
    }

    pub fn s3(config: &S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::Configuration("S3 bucket must be set".into()));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_allow_http(config.allow_http);

        if let Some(ref region) = config.region {
            builder = builder.with_region(region);
        }
        if let Some(ref endpoint) = config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(ref access_key) = config.access_key_id {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(ref secret_key) = config.secret_access_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        let prefix = config.prefix.clone().unwrap_or_default();
        Ok(Self::new(Arc::new(builder.build()?), prefix, "s3"))
    }

    pub fn azure(config: &AzureConfig) -> Result<Self> {
        if config.container.is_empty() {
            return Err(Error::Configuration("Azure container must be set".into()));
        }

        let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(&config.container);

        if let Some(ref account) = config.account {
            builder = builder.with_account(account);
        }
        if let Some(ref access_key) = config.access_key {
            builder = builder.with_access_key(access_key);
        }

        let prefix = config.prefix.clone().unwrap_or_default();
        Ok(Self::new(Arc::new(builder.build()?), prefix, "azure"))
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "", "memory")
    }

    fn full_key(&self, path: &str) -> String {
        join(&self.prefix, path.trim_matches('/'))
    }

    fn object_path(&self, path: &str) -> Result<ObjectPath> {
        let key = self.full_key(path);
        ObjectPath::parse(&key).map_err(|_| Error::InvalidName {
            name: key,
            reason: "not a valid store path",
        })
    }

    async fn list(&self, prefix: &str) -> Result<object_store::ListResult> {
        let path = self.object_path(prefix)?;
        let location = if path.as_ref().is_empty() {
            None
        } else {
            Some(&path)
        };
        match self.store.list_with_delimiter(location).await {
            Ok(result) => Ok(result),
            Err(object_store::Error::NotFound { .. }) => Ok(object_store::ListResult {
                common_prefixes: Vec::new(),
                objects: Vec::new(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ByteStore for ObjectByteStore {
    fn kind(&self) -> &str {
        self.kind
    }

    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut dirs: Vec<String> = self
            .list(prefix)
            .await?
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let mut files: Vec<String> = self
            .list(prefix)
            .await?
            .objects
            .iter()
            .filter_map(|meta| meta.location.filename().map(str::to_string))
            .collect();
        files.sort();
        Ok(files)
    }

    async fn read_bytes(&self, path: &str) -> Result<Bytes> {
        let location = self.object_path(path)?;
        match self.store.get(&location).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(Error::not_found(format!("blob '{location}'")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_bytes(&self, path: &str, data: Bytes) -> Result<()> {
        let location = self.object_path(path)?;
        self.store.put(&location, data.into()).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let location = self.object_path(path)?;
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists_file(&self, path: &str) -> Result<bool> {
        let location = self.object_path(path)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_dir(&self, prefix: &str) -> Result<()> {
        let root = self.object_path(prefix)?;
        let listed = self
            .store
            .list(Some(&root))
            .map_ok(|meta| meta.location)
            .try_collect::<Vec<ObjectPath>>()
            .await;
        let locations = match listed {
            Ok(locations) => locations,
            Err(object_store::Error::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        for location in &locations {
            match self.store.delete(location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(ref local_root) = self.local_root {
            let dir = local_root.join(self.full_key(prefix));
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to remove empty directory"
                    );
                }
            }
        }

        tracing::debug!(
            store = self.kind,
            prefix = %root,
            deleted = locations.len(),
            "Deleted directory"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn exercise(store: &dyn ByteStore) {
        store
            .write_bytes("topic,a/metadata.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        store
            .write_bytes("topic,a/partitions/p1", Bytes::from_static(b"x"))
            .await
            .unwrap();
        store
            .write_bytes("groups/g.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert_eq!(store.list_dirs("").await.unwrap(), vec!["groups", "topic,a"]);
        assert_eq!(store.list_dirs("topic,a").await.unwrap(), vec!["partitions"]);
        assert_eq!(
            store.list_files("topic,a").await.unwrap(),
            vec!["metadata.json"]
        );
        assert_eq!(
            store.read_bytes("topic,a/partitions/p1").await.unwrap(),
            Bytes::from_static(b"x")
        );
        assert!(store.exists_file("groups/g.json").await.unwrap());

        let err = store.read_bytes("missing/blob").await.unwrap_err();
        assert!(err.is_not_found());

        store.delete_file("groups/g.json").await.unwrap();
        store.delete_file("groups/g.json").await.unwrap();
        assert!(!store.exists_file("groups/g.json").await.unwrap());

        store.delete_dir("topic,a").await.unwrap();
        assert!(!store
            .list_dirs("")
            .await
            .unwrap()
            .contains(&"topic,a".to_string()));
        assert!(store.list_files("topic,a/partitions").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&ObjectByteStore::memory()).await;
    }

    #[tokio::test]
    async fn test_local_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectByteStore::local(&LocalConfig {
            root: temp_dir.path().join("log"),
        })
        .unwrap();
        assert_eq!(store.kind(), "local");
        exercise(&store).await;
    }

    #[test]
    fn test_s3_requires_bucket() {
        let err = ObjectByteStore::s3(&S3Config::default()).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_store_config_deserialize() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"type": "s3", "bucket": "logs", "region": "eu-west-1"}"#)
                .unwrap();
        match config {
            StoreConfig::S3(s3) => {
                assert_eq!(s3.bucket, "logs");
                assert_eq!(s3.region.as_deref(), Some("eu-west-1"));
                assert!(!s3.allow_http);
            }
            other => panic!("unexpected config {other:?}"),
        }
    }
}
