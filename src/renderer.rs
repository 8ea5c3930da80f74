// src/renderer.rs

use chrono::{Local, TimeZone};

use crate::colors::GraphColor;
use crate::graph::HistoryItemViewModel;
use crate::tree::{ChangeTreeNode, HistoryTreeNode};

/// Text rendering of the graph rows for a terminal
#[derive(Debug, Clone, Copy)]
pub struct TextRenderer {
    pub color: bool,
}

impl TextRenderer {
    pub fn render_rows(&self, rows: &[HistoryTreeNode]) -> Vec<String> {
        rows.iter()
            .map(|row| match row {
                HistoryTreeNode::HistoryItem(vm) => self.render_item(vm),
                HistoryTreeNode::LoadMore { swimlanes } => {
                    let lanes: String = swimlanes
                        .iter()
                        .map(|lane| self.paint('┆', &lane.color))
                        .collect();
                    format!("{lanes} … load more")
                }
            })
            .collect()
    }

    pub fn render_item(&self, vm: &HistoryItemViewModel) -> String {
        let item = &vm.history_item;
        let node_column = vm.node_column();
        let node_color = vm
            .output_swimlanes
            .get(node_column)
            .or_else(|| vm.input_swimlanes.get(node_column))
            .map(|lane| lane.color.clone())
            .unwrap_or(GraphColor::Lane(0));

        let mut graph = String::new();
        for (column, lane) in vm.input_swimlanes.iter().enumerate() {
            let glyph = if column == node_column {
                '●'
            } else if lane.id == item.id {
                '╯'
            } else {
                '│'
            };
            graph.push_str(&self.paint(glyph, &lane.color));
        }
        if node_column == vm.input_swimlanes.len() {
            graph.push_str(&self.paint('●', &node_color));
        }

        let mut line = graph;
        line.push(' ');
        line.push_str(item.display_id.as_deref().unwrap_or(&item.id));
        if vm.is_current {
            line.push_str(" *");
        }
        for r in &item.references {
            line.push_str(&format!(" ({})", r.name));
        }
        line.push(' ');
        line.push_str(&item.subject);
        if let Some(author) = &item.author {
            line.push_str(&format!(" - {author}"));
        }
        if let Some(timestamp) = item.timestamp {
            line.push_str(&format!(", {}", format_timestamp(timestamp)));
        }
        line
    }

    pub fn render_changes(&self, nodes: &[ChangeTreeNode], indent: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for node in nodes {
            match node {
                ChangeTreeNode::Change(row) => {
                    let name = if indent == 0 {
                        row.change.path.as_str()
                    } else {
                        row.change.path.rsplit('/').next().unwrap_or(&row.change.path)
                    };
                    let mut line = format!("{:indent$}{} {name}", "", row.change.status.letter());
                    if let Some(original) = &row.change.original_path {
                        line.push_str(&format!(" (from {original})"));
                    }
                    lines.push(line);
                }
                ChangeTreeNode::Folder(folder) => {
                    let (label, last) = folder.compressed();
                    lines.push(format!("{:indent$}{label}/", ""));
                    lines.extend(self.render_changes(&last.children, indent + 2));
                }
            }
        }
        lines
    }

    fn paint(&self, glyph: char, color: &GraphColor) -> String {
        if !self.color {
            return glyph.to_string();
        }
        let [r, g, b] = color.rgb();
        format!("\x1b[38;2;{r};{g};{b}m{glyph}\x1b[0m")
    }
}

/// Local time of a millisecond timestamp
pub fn format_timestamp(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M").to_string(),
        None => "unknown".to_string(),
    }
}
