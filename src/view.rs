// src/view.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{HistoryError, Result};
use crate::graph::HistoryItemViewModel;
use crate::model::{HistoryItemsFilter, ViewMode};
use crate::provider::{HistoryItemRefsChange, HistoryProviderEvent};
use crate::sequencer::{Sequencer, ThrottleOutcome, Throttler};
use crate::tree::{project_changes, project_history, ChangeTreeNode, HistoryTreeNode};
use crate::view_model::{HistoryViewModel, RepositorySelection};

/// Ties the view model to a rendered row list and to provider events.
///
/// Row rebuilds and load more requests go through one sequencer so the rows
/// are never written by two operations at once; refresh bursts go through
/// the throttler first.
pub struct HistoryGraphView {
    view_model: Arc<HistoryViewModel>,
    sequencer: Sequencer,
    throttler: Throttler,
    rows: Mutex<Vec<HistoryTreeNode>>,
    outdated: watch::Sender<bool>,
}

impl HistoryGraphView {
    pub fn new(view_model: Arc<HistoryViewModel>) -> Self {
        Self {
            view_model,
            sequencer: Sequencer::new(),
            throttler: Throttler::new(),
            rows: Mutex::new(Vec::new()),
            outdated: watch::Sender::new(false),
        }
    }

    pub fn view_model(&self) -> &Arc<HistoryViewModel> {
        &self.view_model
    }

    fn rows_lock(&self) -> MutexGuard<'_, Vec<HistoryTreeNode>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the rendered rows
    pub fn rows(&self) -> Vec<HistoryTreeNode> {
        self.rows_lock().clone()
    }

    pub fn subscribe_outdated(&self) -> watch::Receiver<bool> {
        self.outdated.subscribe()
    }

    async fn update_children(&self) -> Result<()> {
        let view_models = self.view_model.get_history_items().await?;
        let rows = project_history(&view_models);
        debug!(rows = rows.len(), "history rows updated");
        *self.rows_lock() = rows;
        Ok(())
    }

    async fn throttled_update(&self) -> Result<ThrottleOutcome> {
        let result = self
            .throttler
            .throttle(|| self.sequencer.queue(|| self.update_children()))
            .await;
        if let Err(err) = &result {
            warn!("failed to update history graph: {err}");
        }
        result
    }

    /// Rebuild the rows from whatever the view model has cached
    pub async fn update(&self) -> Result<ThrottleOutcome> {
        self.throttled_update().await
    }

    /// Drop the cached history of the active repository and fetch it again.
    /// On failure the previous rows stay in place.
    pub async fn refresh(&self) -> Result<ThrottleOutcome> {
        self.outdated.send_replace(false);
        self.view_model.clear_repository_state();
        self.throttled_update().await
    }

    pub async fn load_more(&self) -> Result<()> {
        self.sequencer
            .queue(|| async {
                if self.view_model.load_more(None) {
                    self.update_children().await
                } else {
                    Ok(())
                }
            })
            .await
    }

    /// Fetch pages until `history_item_id` is loaded. `None` when history
    /// ran out first.
    pub async fn reveal(&self, history_item_id: &str) -> Result<Option<HistoryItemViewModel>> {
        self.sequencer
            .queue(|| async {
                let loaded = self.find_row(history_item_id);
                if loaded.is_some() {
                    return Ok::<_, HistoryError>(loaded);
                }
                if self.view_model.load_more(Some(history_item_id.to_string())) {
                    self.update_children().await?;
                }
                Ok(self.find_row(history_item_id))
            })
            .await
    }

    fn find_row(&self, history_item_id: &str) -> Option<HistoryItemViewModel> {
        self.rows_lock().iter().find_map(|row| match row {
            HistoryTreeNode::HistoryItem(vm) if vm.history_item.id == history_item_id => Some(vm.clone()),
            _ => None,
        })
    }

    pub async fn set_repository(&self, selection: RepositorySelection) -> Result<ThrottleOutcome> {
        self.view_model.set_repository(selection);
        self.outdated.send_replace(false);
        self.throttled_update().await
    }

    pub async fn set_history_items_filter(&self, filter: HistoryItemsFilter) -> Result<ThrottleOutcome> {
        self.view_model.set_history_items_filter(filter).await?;
        self.refresh().await
    }

    pub async fn set_view_mode(&self, mode: ViewMode) -> Result<()> {
        self.view_model.set_view_mode(mode).await
    }

    /// Change rows of a loaded history item in the current view mode
    pub async fn expand(&self, history_item_id: &str) -> Result<Vec<ChangeTreeNode>> {
        let Some(view_model) = self.find_row(history_item_id) else {
            return Ok(Vec::new());
        };
        let changes = self
            .view_model
            .get_history_item_changes(&view_model.history_item)
            .await?;
        Ok(project_changes(&view_model, &changes, self.view_model.view_mode()))
    }

    pub async fn handle_provider_event(&self, event: HistoryProviderEvent) -> Result<()> {
        match event {
            HistoryProviderEvent::RefsChanged(change) if change.silent => {
                if self.is_affected_by(&change) {
                    info!("background reference update, history graph is outdated");
                    self.outdated.send_replace(true);
                }
                Ok(())
            }
            HistoryProviderEvent::RefsChanged(_)
            | HistoryProviderEvent::CurrentRefChanged
            | HistoryProviderEvent::RemoteRefChanged => self.refresh().await.map(drop),
        }
    }

    fn is_affected_by(&self, change: &HistoryItemRefsChange) -> bool {
        if self.view_model.get_history_items_filter() == Some(HistoryItemsFilter::All) {
            return change.touched().next().is_some();
        }
        let Some(filter) = self.view_model.resolved_history_items_filter() else {
            return false;
        };
        let ids: HashSet<&str> = filter.iter().map(|r| r.id.as_str()).collect();
        change.touched().any(|r| ids.contains(r.id.as_str()))
    }

    fn provider_events(&self) -> Option<broadcast::Receiver<HistoryProviderEvent>> {
        self.view_model.repository()?.history_provider.as_ref()?.subscribe()
    }

    /// Forward provider events of the active repository to this view. The
    /// loop switches providers whenever the active repository changes.
    pub fn spawn_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let view = Arc::clone(self);
        let mut repository = self.view_model.subscribe_repository();
        let mut events = self.provider_events();

        tokio::spawn(async move {
            loop {
                let step = tokio::select! {
                    biased;
                    changed = repository.changed() => LoopStep::RepositoryChanged(changed.is_ok()),
                    event = next_event(&mut events) => LoopStep::Event(event),
                };
                let result = match step {
                    LoopStep::RepositoryChanged(false) => break,
                    LoopStep::RepositoryChanged(true) => {
                        events = view.provider_events();
                        let key = repository.borrow().clone();
                        debug!(repository = ?key, live = events.is_some(), "following provider events");
                        Ok(())
                    }
                    LoopStep::Event(Ok(event)) => view.handle_provider_event(event).await,
                    LoopStep::Event(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                        debug!(skipped, "provider events lagged, refreshing");
                        view.refresh().await.map(drop)
                    }
                    LoopStep::Event(Err(broadcast::error::RecvError::Closed)) => {
                        events = None;
                        Ok(())
                    }
                };
                if let Err(err) = result {
                    warn!("history provider event failed: {err}");
                }
            }
        })
    }
}

enum LoopStep {
    /// `false` once the repository sender is closed
    RepositoryChanged(bool),
    Event(std::result::Result<HistoryProviderEvent, broadcast::error::RecvError>),
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<HistoryProviderEvent>>,
) -> std::result::Result<HistoryProviderEvent, broadcast::error::RecvError> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
