// src/error.rs

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("history provider failed to {operation}: {source:#}")]
    Provider {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("state storage i/o failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid settings in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Git(#[from] git2::Error),
}

impl HistoryError {
    pub(crate) fn provider(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| HistoryError::Provider { operation, source }
    }
}

pub type Result<T, E = HistoryError> = std::result::Result<T, E>;
