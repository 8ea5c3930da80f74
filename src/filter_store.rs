// src/filter_store.rs

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::warn;

use crate::error::Result;
use crate::model::{HistoryItemRefId, HistoryItemsFilter, RepositoryKey};
use crate::storage::StateStorage;

pub const REFERENCES_FILTER_KEY: &str = "graph_view.references_filter";

/// Repository → reference filter.
///
/// Only explicit reference sets are persisted, so a missing entry reads back
/// as `Auto`. `All` lives for the session only.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferenceFilterStore {
    explicit: IndexMap<RepositoryKey, Vec<HistoryItemRefId>>,
    all: HashSet<RepositoryKey>,
}

impl ReferenceFilterStore {
    pub async fn load(storage: &dyn StateStorage) -> Result<Self> {
        let Some(raw) = storage.get(REFERENCES_FILTER_KEY).await? else {
            return Ok(Self::default());
        };

        let explicit = match serde_json::from_str::<Vec<(RepositoryKey, Vec<HistoryItemRefId>)>>(&raw) {
            Ok(pairs) => pairs
                .into_iter()
                .filter(|(_, ids)| !ids.is_empty())
                .collect(),
            Err(err) => {
                warn!("discarding unreadable reference filters: {err}");
                IndexMap::new()
            }
        };

        Ok(Self {
            explicit,
            all: HashSet::new(),
        })
    }

    pub async fn save(&self, storage: &dyn StateStorage) -> Result<()> {
        if self.explicit.is_empty() {
            storage.remove(REFERENCES_FILTER_KEY).await?;
        } else {
            let pairs: Vec<(&RepositoryKey, &Vec<HistoryItemRefId>)> = self.explicit.iter().collect();
            storage
                .set(REFERENCES_FILTER_KEY, serde_json::to_string(&pairs)?)
                .await?;
        }
        storage.flush().await
    }

    pub fn get(&self, repository: &RepositoryKey) -> HistoryItemsFilter {
        if let Some(ids) = self.explicit.get(repository) {
            HistoryItemsFilter::Explicit(ids.clone())
        } else if self.all.contains(repository) {
            HistoryItemsFilter::All
        } else {
            HistoryItemsFilter::Auto
        }
    }

    /// Returns whether the persisted part changed
    pub fn set(&mut self, repository: &RepositoryKey, filter: HistoryItemsFilter) -> bool {
        match filter {
            HistoryItemsFilter::Explicit(ids) if !ids.is_empty() => {
                self.all.remove(repository);
                self.explicit.insert(repository.clone(), ids.clone()) != Some(ids)
            }
            HistoryItemsFilter::All => {
                self.all.insert(repository.clone());
                self.explicit.shift_remove(repository).is_some()
            }
            HistoryItemsFilter::Auto | HistoryItemsFilter::Explicit(_) => {
                self.all.remove(repository);
                self.explicit.shift_remove(repository).is_some()
            }
        }
    }

    pub fn remove(&mut self, repository: &RepositoryKey) -> bool {
        self.set(repository, HistoryItemsFilter::Auto)
    }

    pub fn persisted(&self) -> impl Iterator<Item = (&RepositoryKey, &Vec<HistoryItemRefId>)> {
        self.explicit.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use pretty_assertions::assert_eq;

    fn key(label: &str) -> RepositoryKey {
        RepositoryKey::new("git", label, None)
    }

    #[tokio::test]
    async fn only_explicit_sets_are_persisted() {
        let storage = MemoryStorage::new();
        let mut store = ReferenceFilterStore::default();

        store.set(&key("a"), HistoryItemsFilter::Explicit(vec!["refs/heads/x".into()]));
        store.set(&key("b"), HistoryItemsFilter::All);
        store.set(&key("c"), HistoryItemsFilter::Auto);
        store.save(&storage).await.unwrap();

        assert_eq!(
            storage.snapshot().get(REFERENCES_FILTER_KEY).map(String::as_str),
            Some(r#"[["git:a",["refs/heads/x"]]]"#)
        );

        let loaded = ReferenceFilterStore::load(&storage).await.unwrap();
        assert_eq!(loaded.get(&key("a")), HistoryItemsFilter::Explicit(vec!["refs/heads/x".into()]));
        assert_eq!(loaded.get(&key("b")), HistoryItemsFilter::Auto);
        assert_eq!(loaded.get(&key("c")), HistoryItemsFilter::Auto);
    }

    #[tokio::test]
    async fn persisted_order_is_kept() {
        let storage = MemoryStorage::new();
        let mut store = ReferenceFilterStore::default();
        store.set(&key("z"), HistoryItemsFilter::Explicit(vec!["1".into()]));
        store.set(&key("a"), HistoryItemsFilter::Explicit(vec!["2".into()]));
        store.save(&storage).await.unwrap();

        let loaded = ReferenceFilterStore::load(&storage).await.unwrap();
        let keys: Vec<&str> = loaded.persisted().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["git:z", "git:a"]);
    }

    #[tokio::test]
    async fn auto_erases_entry_and_storage_key() {
        let storage = MemoryStorage::new();
        let mut store = ReferenceFilterStore::default();
        store.set(&key("a"), HistoryItemsFilter::Explicit(vec!["x".into()]));
        store.save(&storage).await.unwrap();

        assert!(store.set(&key("a"), HistoryItemsFilter::Auto));
        store.save(&storage).await.unwrap();

        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn unreadable_value_loads_empty() {
        let storage = MemoryStorage::new();
        storage
            .set(REFERENCES_FILTER_KEY, "{not json".to_string())
            .await
            .unwrap();

        let store = ReferenceFilterStore::load(&storage).await.unwrap();
        assert_eq!(store, ReferenceFilterStore::default());
    }

    #[test]
    fn setting_the_same_ids_reports_no_change() {
        let mut store = ReferenceFilterStore::default();
        let ids = vec!["a".to_string(), "b".to_string()];
        assert!(store.set(&key("r"), HistoryItemsFilter::Explicit(ids.clone())));
        assert!(!store.set(&key("r"), HistoryItemsFilter::Explicit(ids)));
    }
}
