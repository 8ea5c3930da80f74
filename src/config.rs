// src/config.rs

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HistoryError, Result};
use crate::model::ViewMode;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 1000;

/// Settings of the history graph, read from an optional TOML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Number of history items requested per page
    pub page_size: usize,
    /// Initial view mode when the state store has none
    pub view_mode: ViewMode,
    /// Where filters and view mode are persisted between sessions
    pub state_file: Option<PathBuf>,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            view_mode: ViewMode::default(),
            state_file: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|source| HistoryError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// The configured page size bound to `[1, 1000]`
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}
