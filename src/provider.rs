// src/provider.rs

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::model::{HistoryItem, HistoryItemChange, HistoryItemId, HistoryItemRef, HistoryItemRefId};

/// Arguments of a single page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItemsOptions {
    pub history_item_refs: Vec<HistoryItemRefId>,
    pub limit: usize,
    pub skip: usize,
}

/// Live signals raised by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryProviderEvent {
    CurrentRefChanged,
    RemoteRefChanged,
    RefsChanged(HistoryItemRefsChange),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryItemRefsChange {
    pub added: Vec<HistoryItemRef>,
    pub removed: Vec<HistoryItemRef>,
    pub modified: Vec<HistoryItemRef>,
    /// Set for background work (auto fetch) as opposed to a user action
    pub silent: bool,
}

impl HistoryItemRefsChange {
    pub fn touched(&self) -> impl Iterator<Item = &HistoryItemRef> {
        self.added.iter().chain(&self.removed).chain(&self.modified)
    }
}

/// The version control capability a repository exposes for its history.
///
/// Every call may fail or come back empty; `Ok(None)` and `Ok(Some(vec![]))`
/// are treated the same way by the view model.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn provide_history_items(
        &self,
        options: HistoryItemsOptions,
    ) -> anyhow::Result<Option<Vec<HistoryItem>>>;

    async fn provide_history_item_refs(
        &self,
        filter: Option<&[HistoryItemRefId]>,
    ) -> anyhow::Result<Option<Vec<HistoryItemRef>>>;

    async fn provide_history_item_changes(
        &self,
        history_item_id: &str,
        parent_id: Option<&str>,
    ) -> anyhow::Result<Option<Vec<HistoryItemChange>>>;

    async fn resolve_history_item_refs_common_ancestor(
        &self,
        ref_ids: &[HistoryItemRefId],
    ) -> anyhow::Result<Option<HistoryItemId>>;

    fn current_history_item_ref(&self) -> Option<HistoryItemRef>;

    fn current_history_item_remote_ref(&self) -> Option<HistoryItemRef> {
        None
    }

    fn current_history_item_base_ref(&self) -> Option<HistoryItemRef> {
        None
    }

    /// Providers without live updates return `None`.
    fn subscribe(&self) -> Option<broadcast::Receiver<HistoryProviderEvent>> {
        None
    }
}

/// The current, remote and base references of a provider, in that order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegedRefs {
    pub current: Option<HistoryItemRef>,
    pub remote: Option<HistoryItemRef>,
    pub base: Option<HistoryItemRef>,
}

impl PrivilegedRefs {
    pub fn of(provider: &dyn HistoryProvider) -> Self {
        Self {
            current: provider.current_history_item_ref(),
            remote: provider.current_history_item_remote_ref(),
            base: provider.current_history_item_base_ref(),
        }
    }

    /// Present refs, deduplicated by id
    pub fn to_vec(&self) -> Vec<HistoryItemRef> {
        let mut refs: Vec<HistoryItemRef> = Vec::with_capacity(3);
        for r in [&self.current, &self.remote, &self.base].into_iter().flatten() {
            if !refs.iter().any(|existing| existing.id == r.id) {
                refs.push(r.clone());
            }
        }
        refs
    }
}
