// src/model.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::provider::HistoryProvider;

/// Identifies a history item (a commit id for git)
pub type HistoryItemId = String;

/// Identifies a history item reference (`refs/heads/main` for git)
pub type HistoryItemRefId = String;

/// A named, movable pointer into history: a branch, tag or remote-tracking ref
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryItemRef {
    pub id: HistoryItemRefId,
    pub name: String,
    /// The history item the reference currently points at
    pub revision: Option<HistoryItemId>,
    pub category: Option<String>,
    /// Provider supplied color hint, rendered as-is when present
    pub color: Option<String>,
}

impl HistoryItemRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            revision: None,
            category: None,
            color: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Per-item diff statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItemStatistics {
    pub files: usize,
    pub insertions: usize,
    pub deletions: usize,
}

/// An immutable commit-like record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItem {
    pub id: HistoryItemId,
    /// Ordered, first parent first
    pub parent_ids: Vec<HistoryItemId>,
    pub subject: String,
    pub author: Option<String>,
    /// Milliseconds since the Unix epoch
    pub timestamp: Option<i64>,
    pub display_id: Option<String>,
    pub references: Vec<HistoryItemRef>,
    pub statistics: Option<HistoryItemStatistics>,
}

impl HistoryItem {
    pub fn new(id: impl Into<String>, parent_ids: Vec<HistoryItemId>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_ids,
            subject: subject.into(),
            author: None,
            timestamp: None,
            display_id: None,
            references: Vec::new(),
            statistics: None,
        }
    }

    pub fn with_references(mut self, references: Vec<HistoryItemRef>) -> Self {
        self.references = references;
        self
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
}

impl ChangeStatus {
    pub fn letter(self) -> char {
        match self {
            ChangeStatus::Added => 'A',
            ChangeStatus::Modified => 'M',
            ChangeStatus::Deleted => 'D',
            ChangeStatus::Renamed => 'R',
            ChangeStatus::Copied => 'C',
            ChangeStatus::TypeChanged => 'T',
        }
    }
}

/// One changed file of a history item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryItemChange {
    /// Repository relative, `/` separated
    pub path: String,
    pub original_path: Option<String>,
    pub status: ChangeStatus,
}

impl HistoryItemChange {
    pub fn new(path: impl Into<String>, status: ChangeStatus) -> Self {
        Self {
            path: path.into(),
            original_path: None,
            status,
        }
    }
}

/// Stable repository identity, `providerId:label[:rootUri]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryKey(String);

impl RepositoryKey {
    pub fn new(provider_id: &str, label: &str, root: Option<&str>) -> Self {
        match root {
            Some(root) => Self(format!("{provider_id}:{label}:{root}")),
            None => Self(format!("{provider_id}:{label}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A repository known to the view. Lifecycle is owned by whoever adds and
/// removes it; the view only holds references.
pub struct Repository {
    pub provider_id: String,
    pub label: String,
    pub root: Option<PathBuf>,
    pub history_provider: Option<Arc<dyn HistoryProvider>>,
    key: RepositoryKey,
}

impl Repository {
    pub fn new(
        provider_id: impl Into<String>,
        label: impl Into<String>,
        root: Option<PathBuf>,
        history_provider: Option<Arc<dyn HistoryProvider>>,
    ) -> Self {
        let provider_id = provider_id.into();
        let label = label.into();
        let root_str = root.as_ref().map(|root| root.to_string_lossy().into_owned());
        let key = RepositoryKey::new(&provider_id, &label, root_str.as_deref());
        Self {
            provider_id,
            label,
            root,
            history_provider,
            key,
        }
    }

    pub fn key(&self) -> &RepositoryKey {
        &self.key
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("key", &self.key)
            .field("has_history_provider", &self.history_provider.is_some())
            .finish()
    }
}

/// Which references the graph follows for a repository
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryItemsFilter {
    /// Every reference the provider knows about
    All,
    /// Current, remote and base references, recomputed live
    #[default]
    Auto,
    /// An explicit, ordered set of reference ids
    Explicit(Vec<HistoryItemRefId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Tree,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::List => "list",
            ViewMode::Tree => "tree",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "list" => Some(ViewMode::List),
            "tree" => Some(ViewMode::Tree),
            _ => None,
        }
    }
}
