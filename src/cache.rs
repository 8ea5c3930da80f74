// src/cache.rs

use std::collections::HashMap;

use crate::graph::HistoryItemViewModel;
use crate::model::{HistoryItem, HistoryItemId, HistoryItemRef, RepositoryKey};

/// What the next `get_history_items` owes a repository
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadMoreCursor {
    /// Steady state, serve the cache
    #[default]
    Idle,
    /// Fetch one more page
    NextPage,
    /// Fetch pages until this item is loaded or history runs out
    UntilItem(HistoryItemId),
}

impl From<Option<HistoryItemId>> for LoadMoreCursor {
    fn from(cursor: Option<HistoryItemId>) -> Self {
        match cursor {
            Some(id) => LoadMoreCursor::UntilItem(id),
            None => LoadMoreCursor::NextPage,
        }
    }
}

/// Fetched history of one repository. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct RepositoryHistoryState {
    /// The references the items were fetched for
    pub history_items_filter: Vec<HistoryItemRef>,
    /// A prefix of the repository's history, in fetch order
    pub view_models: Vec<HistoryItemViewModel>,
    pub load_more: LoadMoreCursor,
}

impl RepositoryHistoryState {
    pub fn history_items(&self) -> Vec<HistoryItem> {
        self.view_models
            .iter()
            .map(|vm| vm.history_item.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct RepositoryHistoryCache {
    entries: HashMap<RepositoryKey, RepositoryHistoryState>,
}

impl RepositoryHistoryCache {
    pub fn get(&self, repository: &RepositoryKey) -> Option<&RepositoryHistoryState> {
        self.entries.get(repository)
    }

    pub fn insert(&mut self, repository: RepositoryKey, state: RepositoryHistoryState) {
        self.entries.insert(repository, state);
    }

    pub fn remove(&mut self, repository: &RepositoryKey) -> Option<RepositoryHistoryState> {
        self.entries.remove(repository)
    }

    /// Returns false when nothing is cached for the repository yet
    pub fn request_load_more(&mut self, repository: &RepositoryKey, cursor: LoadMoreCursor) -> bool {
        match self.entries.get_mut(repository) {
            Some(state) => {
                state.load_more = cursor;
                true
            }
            None => false,
        }
    }
}
