// src/graph.rs

use crate::colors::{ColorMap, GraphColor};
use crate::model::{HistoryItem, HistoryItemId, HistoryItemRef};

/// One lane of the graph, waiting for the history item `id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwimlaneNode {
    pub id: HistoryItemId,
    pub color: GraphColor,
}

/// A history item plus the state needed to draw its graph row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryItemViewModel {
    pub history_item: HistoryItem,
    pub input_swimlanes: Vec<SwimlaneNode>,
    pub output_swimlanes: Vec<SwimlaneNode>,
    /// The item the current reference points at
    pub is_current: bool,
}

impl HistoryItemViewModel {
    /// Column of the item's own node in its row
    pub fn node_column(&self) -> usize {
        self.input_swimlanes
            .iter()
            .position(|lane| lane.id == self.history_item.id)
            .unwrap_or(self.input_swimlanes.len())
    }
}

/// Lay out `items` (newest first) into swimlanes.
///
/// Each item's input lanes are the previous item's output lanes. The item
/// replaces every lane waiting for it with its first parent, keeps the other
/// lanes, and opens a new lane for each further parent.
pub fn to_view_models(
    items: &[HistoryItem],
    color_map: &ColorMap,
    current: Option<&HistoryItemRef>,
) -> Vec<HistoryItemViewModel> {
    let current_revision = current.and_then(|r| r.revision.as_deref());
    let mut lane_counter = 0usize;
    let mut next_lane_color = || {
        let color = GraphColor::lane(lane_counter);
        lane_counter += 1;
        color
    };

    let mut view_models: Vec<HistoryItemViewModel> = Vec::with_capacity(items.len());
    for item in items {
        let input_swimlanes = view_models
            .last()
            .map(|prev| prev.output_swimlanes.clone())
            .unwrap_or_default();
        let label_color = label_color(item, color_map);

        let mut output_swimlanes = Vec::with_capacity(input_swimlanes.len() + item.parent_ids.len());
        let mut first_parent_added = false;
        for node in &input_swimlanes {
            if node.id != item.id {
                output_swimlanes.push(node.clone());
                continue;
            }
            if first_parent_added {
                continue;
            }
            if let Some(parent) = item.first_parent() {
                output_swimlanes.push(SwimlaneNode {
                    id: parent.to_string(),
                    color: label_color.clone().unwrap_or_else(|| node.color.clone()),
                });
                first_parent_added = true;
            }
        }

        let start = usize::from(first_parent_added);
        for (i, parent) in item.parent_ids.iter().enumerate().skip(start) {
            let color = match (i, &label_color) {
                (0, Some(color)) => color.clone(),
                _ => next_lane_color(),
            };
            output_swimlanes.push(SwimlaneNode {
                id: parent.clone(),
                color,
            });
        }

        view_models.push(HistoryItemViewModel {
            history_item: item.clone(),
            input_swimlanes,
            output_swimlanes,
            is_current: current_revision == Some(item.id.as_str()),
        });
    }

    view_models
}

fn label_color(item: &HistoryItem, color_map: &ColorMap) -> Option<GraphColor> {
    item.references
        .iter()
        .find_map(|r| color_map.get(&r.id).cloned().flatten())
}
