// src/main.rs

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use history_graph::cli::Args;
use history_graph::config::Settings;
use history_graph::git::{GitHistoryProvider, PROVIDER_ID};
use history_graph::renderer::TextRenderer;
use history_graph::storage::{JsonFileStorage, MemoryStorage, StateStorage};
use history_graph::tree::HistoryTreeNode;
use history_graph::{HistoryGraphView, HistoryProvider, HistoryViewModel, Repository};

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = args.settings()?;
    init_tracing(&settings);
    let start_time = Instant::now();

    let storage: Arc<dyn StateStorage> = match &settings.state_file {
        Some(path) => Arc::new(
            JsonFileStorage::open(path)
                .await
                .with_context(|| format!("failed to open state file {}", path.display()))?,
        ),
        None => Arc::new(MemoryStorage::new()),
    };

    let git = Arc::new(
        GitHistoryProvider::open(&args.repo)
            .with_context(|| format!("no git repository at {}", args.repo.display()))?,
    );
    let label = git
        .root()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| git.root().display().to_string());
    let provider: Arc<dyn HistoryProvider> = git.clone();
    let repository = Arc::new(Repository::new(
        PROVIDER_ID,
        label,
        Some(git.root().to_path_buf()),
        Some(provider),
    ));

    let view_model = Arc::new(HistoryViewModel::new(storage, &settings).await?);
    view_model.add_repository(Arc::clone(&repository));
    view_model.set_active_repository(Some(repository));
    let view = HistoryGraphView::new(Arc::clone(&view_model));
    if let Some(mode) = args.mode {
        view.set_view_mode(mode).await?;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Loading history...");

    match args.filter.clone() {
        Some(filter) => view.set_history_items_filter(filter).await?,
        None => view.refresh().await?,
    };
    for page in 1..args.pages {
        spinner.set_message(format!("Loading page {}...", page + 1));
        view.load_more().await?;
    }
    let revealed = match &args.reveal {
        Some(id) => {
            spinner.set_message(format!("Looking for {id}..."));
            Some((id, view.reveal(id).await?))
        }
        None => None,
    };
    spinner.finish_and_clear();

    let rows = view.rows();
    info!(rows = rows.len(), elapsed = ?start_time.elapsed(), "history loaded");

    let renderer = TextRenderer {
        color: !args.no_color && std::io::stdout().is_terminal(),
    };
    for (row, line) in rows.iter().zip(renderer.render_rows(&rows)) {
        println!("{line}");
        let HistoryTreeNode::HistoryItem(vm) = row else {
            continue;
        };
        if args.stat {
            let stats = git.statistics(&vm.history_item.id)?;
            println!(
                "    {} files changed, {} insertions(+), {} deletions(-)",
                stats.files, stats.insertions, stats.deletions
            );
        }
        if args.changes {
            for change in renderer.render_changes(&view.expand(&vm.history_item.id).await?, 4) {
                println!("{change}");
            }
        }
    }

    if let Some((id, found)) = revealed {
        match found {
            Some(vm) => {
                let position = rows.iter().position(|row| {
                    matches!(row, HistoryTreeNode::HistoryItem(r) if r.history_item.id == vm.history_item.id)
                });
                println!("\n{id} is at row {}", position.map_or(0, |i| i + 1));
            }
            None => println!("\n{id} is not reachable from the followed references"),
        }
    }

    if !args.merge_base.is_empty() {
        match view_model.resolve_common_ancestor(&args.merge_base).await? {
            Some(id) => println!("merge base of {}: {id}", args.merge_base.join(", ")),
            None => println!("{} have no common ancestor", args.merge_base.join(", ")),
        }
    }

    view_model.save_state().await?;
    debug!(elapsed = ?start_time.elapsed(), "done");
    Ok(())
}
