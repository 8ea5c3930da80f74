// src/cli.rs

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::error::Result;
use crate::model::{HistoryItemsFilter, ViewMode};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path inside the git repository to show
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    /// History items per page, bound to 1..=1000
    #[arg(long)]
    pub page_size: Option<usize>,

    /// How changed files are listed under each item
    #[arg(long, value_enum)]
    pub mode: Option<ViewMode>,

    /// `all`, `auto`, or comma separated reference ids (refs/heads/main,...)
    #[arg(long, value_parser = parse_filter)]
    pub filter: Option<HistoryItemsFilter>,

    /// Keep loading pages until this history item id is shown
    #[arg(long)]
    pub reveal: Option<String>,

    /// Print the changed files of every item
    #[arg(long)]
    pub changes: bool,

    /// Print diff statistics of every item
    #[arg(long)]
    pub stat: bool,

    /// Print the common ancestor of these reference ids
    #[arg(long, value_delimiter = ',')]
    pub merge_base: Vec<String>,

    /// TOML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON file that keeps filters and view mode between runs
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Disable colored lanes
    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    /// Settings file values with command line overrides applied
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(page_size) = self.page_size {
            settings.page_size = page_size;
        }
        if let Some(mode) = self.mode {
            settings.view_mode = mode;
        }
        if let Some(state_file) = &self.state_file {
            settings.state_file = Some(state_file.clone());
        }
        Ok(settings)
    }
}

pub fn parse_filter(value: &str) -> std::result::Result<HistoryItemsFilter, String> {
    match value.trim() {
        "all" => Ok(HistoryItemsFilter::All),
        "auto" => Ok(HistoryItemsFilter::Auto),
        "" => Err("expected `all`, `auto` or reference ids".to_string()),
        ids => Ok(HistoryItemsFilter::Explicit(
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect(),
        )),
    }
}
