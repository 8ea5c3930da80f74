// src/lib.rs

//! Paginated, filterable commit graph of a repository's history.

pub mod cache;
pub mod cli;
pub mod colors;
pub mod config;
pub mod error;
pub mod filter_store;
pub mod git;
pub mod graph;
pub mod model;
pub mod provider;
pub mod renderer;
pub mod sequencer;
pub mod storage;
pub mod tree;
pub mod view;
pub mod view_model;

pub use error::{HistoryError, Result};
pub use graph::HistoryItemViewModel;
pub use model::{HistoryItem, HistoryItemRef, HistoryItemsFilter, Repository, RepositoryKey, ViewMode};
pub use provider::{HistoryItemsOptions, HistoryProvider, HistoryProviderEvent};
pub use view::HistoryGraphView;
pub use view_model::{HistoryViewModel, RepositorySelection};
