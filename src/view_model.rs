// src/view_model.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};

use crate::cache::{LoadMoreCursor, RepositoryHistoryCache, RepositoryHistoryState};
use crate::colors::assign_colors;
use crate::config::Settings;
use crate::error::{HistoryError, Result};
use crate::filter_store::ReferenceFilterStore;
use crate::graph::{to_view_models, HistoryItemViewModel};
use crate::model::{
    HistoryItem, HistoryItemChange, HistoryItemId, HistoryItemRef, HistoryItemRefId, HistoryItemsFilter, Repository, RepositoryKey,
    ViewMode,
};
use crate::provider::{HistoryItemsOptions, HistoryProvider, PrivilegedRefs};
use crate::storage::StateStorage;

pub const VIEW_MODE_KEY: &str = "graph_view.view_mode";

/// The user's repository pick
#[derive(Clone, Default)]
pub enum RepositorySelection {
    /// Follow the externally active repository
    #[default]
    Auto,
    Repository(Arc<Repository>),
}

impl fmt::Debug for RepositorySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositorySelection::Auto => f.write_str("Auto"),
            RepositorySelection::Repository(repository) => {
                f.debug_tuple("Repository").field(repository.key()).finish()
            }
        }
    }
}

/// Derive the repository the graph shows.
///
/// An explicit pick always wins. On `Auto` the externally active repository
/// is used, then the last resolved one, then the first known one.
pub fn resolve_repository(
    selection: &RepositorySelection,
    active: Option<&Arc<Repository>>,
    last: Option<&Arc<Repository>>,
    first_known: Option<&Arc<Repository>>,
) -> Option<Arc<Repository>> {
    match selection {
        RepositorySelection::Repository(repository) => Some(Arc::clone(repository)),
        RepositorySelection::Auto => active.or(last).or(first_known).cloned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItemsFilterChanged {
    pub repository: RepositoryKey,
    pub filter: HistoryItemsFilter,
}

#[derive(Default)]
struct State {
    repositories: Vec<Arc<Repository>>,
    selection: RepositorySelection,
    active: Option<Arc<Repository>>,
    resolved: Option<Arc<Repository>>,
    cache: RepositoryHistoryCache,
    /// Bumped whenever a repository's cache entry is dropped so in-flight
    /// fetches do not write back results for a state that no longer exists
    cache_epochs: HashMap<RepositoryKey, u64>,
    filters: ReferenceFilterStore,
    view_mode: ViewMode,
}

impl State {
    fn epoch(&self, key: &RepositoryKey) -> u64 {
        self.cache_epochs.get(key).copied().unwrap_or_default()
    }

    fn bump_epoch(&mut self, key: &RepositoryKey) {
        *self.cache_epochs.entry(key.clone()).or_default() += 1;
    }
}

enum CacheLookup {
    Hit(Vec<HistoryItemViewModel>),
    Pending {
        cursor: LoadMoreCursor,
        filter: Option<Vec<HistoryItemRef>>,
        items: Vec<HistoryItem>,
        epoch: u64,
    },
}

/// Paginated, filtered history of the active repository.
pub struct HistoryViewModel {
    storage: Arc<dyn StateStorage>,
    page_size: usize,
    state: Mutex<State>,
    is_empty: watch::Sender<bool>,
    item_count: watch::Sender<usize>,
    view_mode: watch::Sender<ViewMode>,
    repository: watch::Sender<Option<RepositoryKey>>,
    filter_changed: broadcast::Sender<HistoryItemsFilterChanged>,
}

impl HistoryViewModel {
    pub async fn new(storage: Arc<dyn StateStorage>, settings: &Settings) -> Result<Self> {
        let view_mode = storage
            .get(VIEW_MODE_KEY)
            .await?
            .and_then(|value| ViewMode::parse(&value))
            .unwrap_or(settings.view_mode);
        let filters = ReferenceFilterStore::load(storage.as_ref()).await?;
        debug!(
            view_mode = view_mode.as_str(),
            persisted_filters = filters.persisted().count(),
            "loaded history view state"
        );

        let (filter_changed, _) = broadcast::channel(16);
        Ok(Self {
            storage,
            page_size: settings.effective_page_size(),
            state: Mutex::new(State {
                filters,
                view_mode,
                ..State::default()
            }),
            is_empty: watch::Sender::new(true),
            item_count: watch::Sender::new(0),
            view_mode: watch::Sender::new(view_mode),
            repository: watch::Sender::new(None),
            filter_changed,
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn repository(&self) -> Option<Arc<Repository>> {
        self.state().resolved.clone()
    }

    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.state().repositories.clone()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.state().view_mode
    }

    pub fn subscribe_is_empty(&self) -> watch::Receiver<bool> {
        self.is_empty.subscribe()
    }

    pub fn subscribe_item_count(&self) -> watch::Receiver<usize> {
        self.item_count.subscribe()
    }

    pub fn subscribe_view_mode(&self) -> watch::Receiver<ViewMode> {
        self.view_mode.subscribe()
    }

    pub fn subscribe_repository(&self) -> watch::Receiver<Option<RepositoryKey>> {
        self.repository.subscribe()
    }

    pub fn subscribe_filter_changed(&self) -> broadcast::Receiver<HistoryItemsFilterChanged> {
        self.filter_changed.subscribe()
    }

    pub fn add_repository(&self, repository: Arc<Repository>) {
        let mut state = self.state();
        if state.repositories.iter().any(|r| r.key() == repository.key()) {
            return;
        }
        debug!(repository = %repository.key(), "repository added");
        state.repositories.push(repository);
        self.update_resolved(&mut state);
    }

    pub fn remove_repository(&self, key: &RepositoryKey) {
        let mut state = self.state();
        state.repositories.retain(|r| r.key() != key);
        state.cache.remove(key);
        state.bump_epoch(key);

        let selected_removed = matches!(
            &state.selection,
            RepositorySelection::Repository(selected) if selected.key() == key
        );
        if selected_removed {
            let fallback = state.repositories.first().cloned();
            state.selection = fallback.map_or(RepositorySelection::Auto, RepositorySelection::Repository);
        }
        if state.active.as_ref().is_some_and(|r| r.key() == key) {
            state.active = None;
        }
        if state.resolved.as_ref().is_some_and(|r| r.key() == key) {
            state.resolved = None;
        }

        debug!(repository = %key, selection = ?state.selection, "repository removed");
        self.update_resolved(&mut state);
    }

    /// The externally active repository changed
    pub fn set_active_repository(&self, repository: Option<Arc<Repository>>) {
        let mut state = self.state();
        state.active = repository;
        self.update_resolved(&mut state);
    }

    pub fn set_repository(&self, selection: RepositorySelection) {
        let mut state = self.state();
        state.selection = selection;
        self.update_resolved(&mut state);
    }

    fn update_resolved(&self, state: &mut State) {
        let resolved = resolve_repository(
            &state.selection,
            state.active.as_ref(),
            state.resolved.as_ref(),
            state.repositories.first(),
        );
        let key = resolved.as_ref().map(|r| r.key().clone());
        trace!(repository = ?key, "resolved repository");
        state.resolved = resolved;
        self.repository.send_if_modified(|current| {
            if *current == key {
                return false;
            }
            *current = key;
            true
        });
    }

    fn publish_counts(&self, count: usize) {
        self.item_count.send_replace(count);
        self.is_empty.send_replace(count == 0);
    }

    /// The current page of view models, fetching only when the cache owes a
    /// page or holds nothing yet.
    pub async fn get_history_items(&self) -> Result<Vec<HistoryItemViewModel>> {
        let Some((repository, provider)) = self.repository_with_provider() else {
            self.publish_counts(0);
            return Ok(Vec::new());
        };
        let key = repository.key().clone();

        let lookup = {
            let state = self.state();
            match state.cache.get(&key) {
                Some(entry) if entry.load_more == LoadMoreCursor::Idle => {
                    CacheLookup::Hit(entry.view_models.clone())
                }
                Some(entry) => CacheLookup::Pending {
                    cursor: entry.load_more.clone(),
                    filter: Some(entry.history_items_filter.clone()),
                    items: entry.history_items(),
                    epoch: state.epoch(&key),
                },
                None => CacheLookup::Pending {
                    cursor: LoadMoreCursor::NextPage,
                    filter: None,
                    items: Vec::new(),
                    epoch: state.epoch(&key),
                },
            }
        };
        let (cursor, cached_filter, mut items, epoch) = match lookup {
            CacheLookup::Hit(view_models) => {
                self.publish_counts(view_models.len());
                return Ok(view_models);
            }
            CacheLookup::Pending {
                cursor,
                filter,
                items,
                epoch,
            } => (cursor, filter, items, epoch),
        };

        let filter_refs = match cached_filter {
            Some(refs) => refs,
            None => self.resolve_history_items_filter(&key, provider.as_ref()).await?,
        };
        let ref_ids: Vec<HistoryItemRefId> = filter_refs.iter().map(|r| r.id.clone()).collect();

        loop {
            let options = HistoryItemsOptions {
                history_item_refs: ref_ids.clone(),
                limit: self.page_size,
                skip: items.len(),
            };
            debug!(repository = %key, skip = options.skip, limit = options.limit, "fetching history items");
            let page = provider
                .provide_history_items(options)
                .await
                .map_err(HistoryError::provider("provide history items"))?
                .unwrap_or_default();
            let fetched = page.len();
            items.extend(page);
            trace!(repository = %key, fetched, total = items.len(), "fetched history page");

            match &cursor {
                LoadMoreCursor::UntilItem(target)
                    if fetched > 0 && !items.iter().any(|item| &item.id == target) =>
                {
                    continue
                }
                _ => break,
            }
        }

        let privileged = PrivilegedRefs::of(provider.as_ref());
        let color_map = assign_colors(&privileged, &filter_refs);
        let view_models = to_view_models(&items, &color_map, privileged.current.as_ref());

        {
            let mut state = self.state();
            if state.epoch(&key) == epoch {
                state.cache.insert(
                    key.clone(),
                    RepositoryHistoryState {
                        history_items_filter: filter_refs,
                        view_models: view_models.clone(),
                        load_more: LoadMoreCursor::Idle,
                    },
                );
            } else {
                debug!(repository = %key, "state cleared during fetch, not caching result");
            }
        }

        self.publish_counts(view_models.len());
        Ok(view_models)
    }

    fn repository_with_provider(&self) -> Option<(Arc<Repository>, Arc<dyn HistoryProvider>)> {
        let repository = self.repository()?;
        let provider = repository.history_provider.clone()?;
        Some((repository, provider))
    }

    async fn resolve_history_items_filter(
        &self,
        key: &RepositoryKey,
        provider: &dyn HistoryProvider,
    ) -> Result<Vec<HistoryItemRef>> {
        let filter = self.state().filters.get(key);
        let privileged = PrivilegedRefs::of(provider);

        match filter {
            HistoryItemsFilter::All => Ok(provider
                .provide_history_item_refs(None)
                .await
                .map_err(HistoryError::provider("provide history item refs"))?
                .unwrap_or_default()),
            HistoryItemsFilter::Auto => Ok(privileged.to_vec()),
            HistoryItemsFilter::Explicit(ids) => {
                let refs = provider
                    .provide_history_item_refs(Some(ids.as_slice()))
                    .await
                    .map_err(HistoryError::provider("provide history item refs"))?
                    .unwrap_or_default();
                let matched: Vec<HistoryItemRef> = ids
                    .iter()
                    .filter_map(|id| refs.iter().find(|r| &r.id == id).cloned())
                    .collect();

                if matched.is_empty() {
                    info!(repository = %key, ?ids, "saved references no longer exist, filter reset to auto");
                    self.state().filters.remove(key);
                    self.save_filters().await?;
                    return Ok(privileged.to_vec());
                }

                let matched_ids: Vec<HistoryItemRefId> = matched.iter().map(|r| r.id.clone()).collect();
                let changed = self
                    .state()
                    .filters
                    .set(key, HistoryItemsFilter::Explicit(matched_ids));
                if changed {
                    debug!(repository = %key, "dropped stale references from saved filter");
                    self.save_filters().await?;
                }
                Ok(matched)
            }
        }
    }

    async fn save_filters(&self) -> Result<()> {
        let filters = self.state().filters.clone();
        filters.save(self.storage.as_ref()).await
    }

    /// Ask the next `get_history_items` for another page, or for pages up to
    /// `cursor`. Returns false when nothing has been fetched yet.
    pub fn load_more(&self, cursor: Option<HistoryItemId>) -> bool {
        let Some(repository) = self.repository() else {
            return false;
        };
        let requested = self
            .state()
            .cache
            .request_load_more(repository.key(), LoadMoreCursor::from(cursor));
        trace!(repository = %repository.key(), requested, "load more");
        requested
    }

    /// Filter of the active repository, `None` without one
    pub fn get_history_items_filter(&self) -> Option<HistoryItemsFilter> {
        let repository = self.repository()?;
        Some(self.state().filters.get(repository.key()))
    }

    /// References the cached items of the active repository were fetched for
    pub fn resolved_history_items_filter(&self) -> Option<Vec<HistoryItemRef>> {
        let repository = self.repository()?;
        self.state()
            .cache
            .get(repository.key())
            .map(|entry| entry.history_items_filter.clone())
    }

    /// Store the filter of the active repository. Does not refetch; callers
    /// clear the repository state for that.
    pub async fn set_history_items_filter(&self, filter: HistoryItemsFilter) -> Result<()> {
        let Some(repository) = self.repository() else {
            return Ok(());
        };
        let key = repository.key().clone();

        let filter = {
            let mut state = self.state();
            state.filters.set(&key, filter);
            // empty explicit sets are stored as auto
            state.filters.get(&key)
        };
        self.save_filters().await?;
        debug!(repository = %key, ?filter, "history items filter changed");

        // no subscribers is fine
        let _ = self.filter_changed.send(HistoryItemsFilterChanged {
            repository: key,
            filter,
        });
        Ok(())
    }

    pub async fn set_view_mode(&self, mode: ViewMode) -> Result<()> {
        self.state().view_mode = mode;
        self.storage
            .set(VIEW_MODE_KEY, mode.as_str().to_string())
            .await?;
        self.storage.flush().await?;
        self.view_mode.send_replace(mode);
        Ok(())
    }

    /// Drop the cached history of the active repository
    pub fn clear_repository_state(&self) {
        let Some(repository) = self.repository() else {
            return;
        };
        let mut state = self.state();
        if state.cache.remove(repository.key()).is_some() {
            debug!(repository = %repository.key(), "cleared repository history state");
        }
        state.bump_epoch(repository.key());
    }

    /// The cached view model the current reference points at
    pub fn get_current_history_item_tree_element(&self) -> Option<HistoryItemViewModel> {
        let repository = self.repository()?;
        let state = self.state();
        state
            .cache
            .get(repository.key())?
            .view_models
            .iter()
            .find(|vm| vm.is_current)
            .cloned()
    }

    /// Changed files of `item` against its first parent
    pub async fn get_history_item_changes(&self, item: &HistoryItem) -> Result<Vec<HistoryItemChange>> {
        let Some((_, provider)) = self.repository_with_provider() else {
            return Ok(Vec::new());
        };
        Ok(provider
            .provide_history_item_changes(&item.id, item.first_parent())
            .await
            .map_err(HistoryError::provider("provide history item changes"))?
            .unwrap_or_default())
    }

    pub async fn resolve_common_ancestor(&self, ref_ids: &[HistoryItemRefId]) -> Result<Option<HistoryItemId>> {
        let Some((_, provider)) = self.repository_with_provider() else {
            return Ok(None);
        };
        provider
            .resolve_history_item_refs_common_ancestor(ref_ids)
            .await
            .map_err(HistoryError::provider("resolve common ancestor"))
    }

    /// Persist filters and view mode, on session end
    pub async fn save_state(&self) -> Result<()> {
        let mode = self.view_mode();
        self.storage
            .set(VIEW_MODE_KEY, mode.as_str().to_string())
            .await?;
        self.save_filters().await
    }
}
