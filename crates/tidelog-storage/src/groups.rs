//! Consumer group offset store.
//!
//! One blob per group at `groups/<name>.json`. Every write replaces the
//! whole blob; concurrent writers race and the last one wins.

use crate::layout::GROUPS_DIR;
use crate::store::{join, ByteStore};
use bytes::Bytes;
use std::sync::Arc;
use tidelog_core::{glob_match, ConsumerGroupState, Error, Result};

const GROUP_FILE_SUFFIX: &str = ".json";

#[derive(Clone)]
pub struct GroupStore {
    store: Arc<dyn ByteStore>,
}

impl GroupStore {
    pub fn new(store: Arc<dyn ByteStore>) -> Self {
        Self { store }
    }

    fn path(group: &str) -> String {
        join(GROUPS_DIR, &format!("{group}{GROUP_FILE_SUFFIX}"))
    }

    /// Persisted state of `group`, `None` if it never committed.
    pub async fn get(&self, group: &str) -> Result<Option<ConsumerGroupState>> {
        let path = Self::path(group);
        match self.store.read_bytes(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::Codec {
                    path,
                    message: e.to_string(),
                }),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the persisted state of `group`.
    pub async fn set(&self, group: &str, state: &ConsumerGroupState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.store
            .write_bytes(&Self::path(group), Bytes::from(bytes))
            .await
    }

    pub async fn list(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_files(GROUPS_DIR)
            .await?
            .into_iter()
            .filter_map(|name| name.strip_suffix(GROUP_FILE_SUFFIX).map(str::to_string))
            .filter(|group| glob_match(pattern, group))
            .collect())
    }

    pub async fn delete(&self, group: &str) -> Result<()> {
        self.store.delete_file(&Self::path(group)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectByteStore;
    use tidelog_core::GroupLifecycle;

    #[tokio::test]
    async fn test_set_overwrites_whole_state() {
        let groups = GroupStore::new(Arc::new(ObjectByteStore::memory()));
        assert_eq!(groups.get("g1").await.unwrap(), None);

        let mut state = ConsumerGroupState::default();
        state.offsets.entry("a".into()).or_default().insert(0, 5);
        state.offsets.entry("b".into()).or_default().insert(1, 9);
        groups.set("g1", &state).await.unwrap();

        let mut replacement = ConsumerGroupState::default();
        replacement.offsets.entry("a".into()).or_default().insert(0, 6);
        replacement.state = GroupLifecycle::Empty;
        groups.set("g1", &replacement).await.unwrap();

        assert_eq!(groups.get("g1").await.unwrap(), Some(replacement));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let groups = GroupStore::new(Arc::new(ObjectByteStore::memory()));
        for name in ["etl-1", "etl-2", "audit"] {
            groups.set(name, &ConsumerGroupState::default()).await.unwrap();
        }
        assert_eq!(groups.list("etl-*").await.unwrap(), vec!["etl-1", "etl-2"]);

        groups.delete("etl-1").await.unwrap();
        groups.delete("etl-1").await.unwrap();
        assert_eq!(groups.list("*").await.unwrap(), vec!["audit", "etl-2"]);
    }
}
