//! Byte-Store Adapter
//!
//! The minimal capability surface the log layout needs from a physical
//! backend. Paths are `/`-separated and relative to the store root; a
//! "directory" is any prefix that has at least one entry beneath it (object
//! stores have no real directories).
//!
//! No ordering or atomicity guarantees are made beyond those of the
//! underlying store. Readers must not assume a partially written blob is
//! never visible.

use async_trait::async_trait;
use bytes::Bytes;
use tidelog_core::Result;

#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Short name of the physical backend ("local", "s3", "azure", "memory").
    fn kind(&self) -> &str;

    /// Names of the immediate sub-directories of `prefix`.
    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>>;

    /// Names of the files directly under `prefix`.
    async fn list_files(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read a whole blob.
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing is stored at `path`.
    async fn read_bytes(&self, path: &str) -> Result<Bytes>;

    /// Create or overwrite a blob, creating parent structure as needed.
    async fn write_bytes(&self, path: &str, data: Bytes) -> Result<()>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete_file(&self, path: &str) -> Result<()>;

    async fn exists_file(&self, path: &str) -> Result<bool>;

    /// Delete every blob under `prefix`, recursively.
    async fn delete_dir(&self, prefix: &str) -> Result<()> {
        for dir in self.list_dirs(prefix).await? {
            self.delete_dir(&join(prefix, &dir)).await?;
        }
        for file in self.list_files(prefix).await? {
            self.delete_file(&join(prefix, &file)).await?;
        }
        Ok(())
    }
}

/// Join two path fragments with a single `/`.
pub fn join(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
