// src/tree.rs

use std::collections::BTreeMap;

use crate::graph::{HistoryItemViewModel, SwimlaneNode};
use crate::model::{HistoryItemChange, HistoryItemId, ViewMode};

/// Top level rows of the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryTreeNode {
    HistoryItem(HistoryItemViewModel),
    /// Placeholder after the last fetched item while history continues
    LoadMore { swimlanes: Vec<SwimlaneNode> },
}

/// A changed file under its history item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    pub history_item_id: HistoryItemId,
    pub change: HistoryItemChange,
    /// Lanes passing through the row, so connectors continue past it
    pub swimlanes: Vec<SwimlaneNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeTreeNode {
    Folder(ChangeFolder),
    Change(ChangeRow),
}

impl ChangeTreeNode {
    pub fn is_incompressible(&self) -> bool {
        match self {
            ChangeTreeNode::Folder(folder) => folder.is_incompressible(),
            ChangeTreeNode::Change(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFolder {
    pub name: String,
    /// Repository relative path, empty for the root
    pub path: String,
    /// Root is 0
    pub depth: usize,
    /// Folders first, then files, each by name
    pub children: Vec<ChangeTreeNode>,
}

impl ChangeFolder {
    /// A folder can't be merged into its only child when it is empty, the
    /// root, or a child of the root
    pub fn is_incompressible(&self) -> bool {
        self.children.is_empty() || self.depth <= 1
    }

    /// Merge compressible single-folder chains for display, `a/b/c` style
    pub fn compressed(&self) -> (String, &ChangeFolder) {
        let mut label = self.name.clone();
        let mut folder = self;
        while let [ChangeTreeNode::Folder(only)] = folder.children.as_slice() {
            if only.is_incompressible() {
                break;
            }
            label.push('/');
            label.push_str(&only.name);
            folder = only;
        }
        (label, folder)
    }
}

/// Rows for the fetched history, with a load more row while the last item
/// still has open lanes.
pub fn project_history(view_models: &[HistoryItemViewModel]) -> Vec<HistoryTreeNode> {
    let mut nodes: Vec<HistoryTreeNode> = view_models
        .iter()
        .cloned()
        .map(HistoryTreeNode::HistoryItem)
        .collect();

    if let Some(last) = view_models.last() {
        if !last.output_swimlanes.is_empty() {
            nodes.push(HistoryTreeNode::LoadMore {
                swimlanes: last.output_swimlanes.clone(),
            });
        }
    }

    nodes
}

/// Rows for the changes of one history item
pub fn project_changes(
    view_model: &HistoryItemViewModel,
    changes: &[HistoryItemChange],
    mode: ViewMode,
) -> Vec<ChangeTreeNode> {
    let rows = changes.iter().map(|change| ChangeRow {
        history_item_id: view_model.history_item.id.clone(),
        change: change.clone(),
        swimlanes: view_model.output_swimlanes.clone(),
    });

    match mode {
        ViewMode::List => rows.map(ChangeTreeNode::Change).collect(),
        ViewMode::Tree => build_tree(rows).children,
    }
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: BTreeMap<String, ChangeRow>,
}

fn build_tree(rows: impl Iterator<Item = ChangeRow>) -> ChangeFolder {
    let mut root = DirBuilder::default();
    for row in rows {
        let mut segments: Vec<&str> = row.change.path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(file_name) = segments.pop() else {
            continue;
        };
        let file_name = file_name.to_string();

        let mut current = &mut root;
        for segment in segments {
            current = current.dirs.entry(segment.to_string()).or_default();
        }
        current.files.insert(file_name, row);
    }

    finish(root, String::new(), String::new(), 0)
}

fn finish(builder: DirBuilder, name: String, path: String, depth: usize) -> ChangeFolder {
    let mut children = Vec::with_capacity(builder.dirs.len() + builder.files.len());
    for (dir_name, dir) in builder.dirs {
        let dir_path = if path.is_empty() {
            dir_name.clone()
        } else {
            format!("{path}/{dir_name}")
        };
        children.push(ChangeTreeNode::Folder(finish(dir, dir_name, dir_path, depth + 1)));
    }
    children.extend(builder.files.into_values().map(ChangeTreeNode::Change));

    ChangeFolder {
        name,
        path,
        depth,
        children,
    }
}
