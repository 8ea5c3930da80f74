// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use history_graph::config::Settings;
use history_graph::model::{ChangeStatus, HistoryItemChange, HistoryItemId, HistoryItemRefId};
use history_graph::storage::{MemoryStorage, StateStorage};
use history_graph::{
    HistoryItem, HistoryItemRef, HistoryItemViewModel, HistoryItemsOptions, HistoryProvider, HistoryProviderEvent,
    HistoryViewModel, Repository,
};

/// `count` items in a single line of history, newest first: `c0 -> c1 -> ...`
pub fn linear_history(count: usize) -> Vec<HistoryItem> {
    (0..count)
        .map(|i| {
            let parents = if i + 1 < count { vec![format!("c{}", i + 1)] } else { Vec::new() };
            HistoryItem::new(format!("c{i}"), parents, format!("commit {i}"))
        })
        .collect()
}

pub fn ids(view_models: &[HistoryItemViewModel]) -> Vec<String> {
    view_models.iter().map(|vm| vm.history_item.id.clone()).collect()
}

pub fn main_ref() -> HistoryItemRef {
    HistoryItemRef::new("refs/heads/main", "main").with_revision("c0")
}

pub fn remote_ref() -> HistoryItemRef {
    HistoryItemRef::new("refs/remotes/origin/main", "origin/main").with_revision("c1")
}

/// Provider over a fixed item list that records every call it gets
pub struct ScriptedProvider {
    items: Mutex<Vec<HistoryItem>>,
    refs: Mutex<Vec<HistoryItemRef>>,
    current: Mutex<Option<HistoryItemRef>>,
    remote: Mutex<Option<HistoryItemRef>>,
    base: Mutex<Option<HistoryItemRef>>,
    item_calls: Mutex<Vec<HistoryItemsOptions>>,
    ref_calls: AtomicUsize,
    failing: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: broadcast::Sender<HistoryProviderEvent>,
}

impl ScriptedProvider {
    pub fn new(items: Vec<HistoryItem>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            items: Mutex::new(items),
            refs: Mutex::new(vec![main_ref(), remote_ref()]),
            current: Mutex::new(Some(main_ref())),
            remote: Mutex::new(Some(remote_ref())),
            base: Mutex::new(None),
            item_calls: Mutex::new(Vec::new()),
            ref_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            gate: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            events,
        })
    }

    pub fn set_items(&self, items: Vec<HistoryItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_refs(&self, refs: Vec<HistoryItemRef>) {
        *self.refs.lock().unwrap() = refs;
    }

    pub fn set_base(&self, base: Option<HistoryItemRef>) {
        *self.base.lock().unwrap() = base;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Page requests wait on the returned notify until released
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.notify_waiters();
        }
    }

    pub fn skips(&self) -> Vec<usize> {
        self.item_calls.lock().unwrap().iter().map(|options| options.skip).collect()
    }

    pub fn item_calls(&self) -> Vec<HistoryItemsOptions> {
        self.item_calls.lock().unwrap().clone()
    }

    pub fn ref_calls(&self) -> usize {
        self.ref_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Live event subscriptions
    pub fn subscribers(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn emit(&self, event: HistoryProviderEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl HistoryProvider for ScriptedProvider {
    async fn provide_history_items(
        &self,
        options: HistoryItemsOptions,
    ) -> anyhow::Result<Option<Vec<HistoryItem>>> {
        self.item_calls.lock().unwrap().push(options.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            bail!("provider unavailable");
        }
        let items = self.items.lock().unwrap();
        let page = items.iter().skip(options.skip).take(options.limit).cloned().collect();
        Ok(Some(page))
    }

    async fn provide_history_item_refs(
        &self,
        filter: Option<&[HistoryItemRefId]>,
    ) -> anyhow::Result<Option<Vec<HistoryItemRef>>> {
        self.ref_calls.fetch_add(1, Ordering::SeqCst);
        let refs = self.refs.lock().unwrap();
        Ok(Some(
            refs.iter()
                .filter(|r| filter.map_or(true, |ids| ids.contains(&r.id)))
                .cloned()
                .collect(),
        ))
    }

    async fn provide_history_item_changes(
        &self,
        history_item_id: &str,
        _parent_id: Option<&str>,
    ) -> anyhow::Result<Option<Vec<HistoryItemChange>>> {
        Ok(Some(vec![
            HistoryItemChange::new(format!("src/{history_item_id}/mod.rs"), ChangeStatus::Modified),
            HistoryItemChange::new("src/lib.rs", ChangeStatus::Modified),
            HistoryItemChange::new("README.md", ChangeStatus::Added),
        ]))
    }

    async fn resolve_history_item_refs_common_ancestor(
        &self,
        ref_ids: &[HistoryItemRefId],
    ) -> anyhow::Result<Option<HistoryItemId>> {
        let refs = self.refs.lock().unwrap();
        let revisions: Vec<&str> = ref_ids
            .iter()
            .filter_map(|id| refs.iter().find(|r| &r.id == id))
            .filter_map(|r| r.revision.as_deref())
            .collect();
        let items = self.items.lock().unwrap();
        // linear history: the oldest revision is the ancestor
        Ok(items
            .iter()
            .rev()
            .find(|item| revisions.contains(&item.id.as_str()))
            .map(|item| item.id.clone()))
    }

    fn current_history_item_ref(&self) -> Option<HistoryItemRef> {
        self.current.lock().unwrap().clone()
    }

    fn current_history_item_remote_ref(&self) -> Option<HistoryItemRef> {
        self.remote.lock().unwrap().clone()
    }

    fn current_history_item_base_ref(&self) -> Option<HistoryItemRef> {
        self.base.lock().unwrap().clone()
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<HistoryProviderEvent>> {
        Some(self.events.subscribe())
    }
}

pub fn repository(label: &str, provider: &Arc<ScriptedProvider>) -> Arc<Repository> {
    let provider: Arc<dyn HistoryProvider> = provider.clone();
    Arc::new(Repository::new("git", label, None, Some(provider)))
}

pub fn settings(page_size: usize) -> Settings {
    Settings {
        page_size,
        ..Settings::default()
    }
}

/// A view model showing `repository`, backed by `storage`
pub async fn view_model_with(
    storage: Arc<MemoryStorage>,
    page_size: usize,
    repository: &Arc<Repository>,
) -> HistoryViewModel {
    let storage: Arc<dyn StateStorage> = storage;
    let view_model = HistoryViewModel::new(storage, &settings(page_size)).await.unwrap();
    view_model.add_repository(Arc::clone(repository));
    view_model.set_active_repository(Some(Arc::clone(repository)));
    view_model
}
