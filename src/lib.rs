pub mod browse;
pub mod config;
pub mod db;
pub mod debounce;
pub mod embeddings;
pub mod index;
pub mod navigation;
pub mod render;
pub mod scoring;
pub mod similarity;
pub mod surface;
pub mod types;
pub mod watcher;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

pub use crate::config::DiscoveryConfig;
pub use crate::navigation::{transition, NavEffect, NavEvent, NavigationState};
pub use crate::render::RenderStrategy;
pub use crate::scoring::RelevanceScorer;
pub use crate::surface::{BrowseListing, BrowseView, QuickOpen};
pub use crate::types::{DateGroup, GroupedBucket, Note, ScoredNote, SimilarNote};

/// Install the global tracing subscriber.
/// Release builds only log WARN and above to avoid leaking note content.
pub fn init_tracing() {
    #[cfg(debug_assertions)]
    tracing_subscriber::fmt::init();
    #[cfg(not(debug_assertions))]
    tracing_subscriber::fmt().with_max_level(tracing::Level::WARN).init();
}

/// Print "for you" suggestions and the browse listing for a Joplin collection.
#[derive(Debug, PartialEq, Parser)]
#[command(name = "note-discovery", rename_all = "kebab")]
pub struct Options {
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Rank suggestions relative to this note, using local embeddings.
    #[arg(long, value_name = "NOTE_ID")]
    pub related: Option<String>,
    /// Keep running and print again whenever the database changes.
    #[arg(long)]
    pub watch: bool,
    /// Search query; words are joined with spaces.
    pub query: Vec<String>,
}

#[derive(Serialize)]
struct Report<'a> {
    suggestions: Vec<ScoredNote>,
    palette_render: RenderStrategy,
    browse: &'a BrowseListing,
    browse_render: RenderStrategy,
}

/// Load the collection, print palette suggestions and the browse listing as JSON,
/// and optionally keep printing as the database changes.
pub async fn run(options: Options) -> Result<()> {
    let config = match &options.config {
        Some(path) => DiscoveryConfig::load(path)?,
        None => DiscoveryConfig::default(),
    };
    let db_path = config
        .resolve_db_path()
        .context("Joplin database not found; set db_path in the config")?;
    let access_path = config.resolve_access_log_path(&db_path);

    let watch_config = watcher::WatchConfig {
        db_path: db_path.clone(),
        access_log_path: Some(access_path.clone()),
        poll: config.watcher_poll(),
        quiet: config.watcher_quiet(),
    };
    let initial = {
        let cfg = watch_config.clone();
        tokio::task::spawn_blocking(move || watcher::refresh(&cfg, 0)).await??
    };
    tracing::debug!("Loaded {} notes", initial.notes.len());

    let (access_sink, _writer) = surface::AccessLogSink::spawn(db::AccessLog::open(&access_path)?);
    let access_sink = Arc::new(access_sink);

    let mut palette = QuickOpen::new(config.clone(), initial.notes.clone())
        .with_sinks(Arc::new(surface::UrlSelectionSink), access_sink.clone());
    let mut browse = BrowseView::new(config.clone(), initial.notes.clone())
        .with_sinks(Arc::new(surface::UrlSelectionSink), access_sink);

    let mut local_similarity = None;
    if let Some(note_id) = &options.related {
        let cache_dir = db_path
            .parent()
            .map(|p| p.join("note-discovery").join("models"))
            .unwrap_or_else(|| PathBuf::from(".fastembed_cache"));
        let pipeline = tokio::task::spawn_blocking(move || {
            embeddings::EmbeddingPipeline::new(&cache_dir, true)
        })
        .await??;
        let provider = index::LocalSimilarity::build(Arc::new(pipeline), initial.notes.clone()).await?;
        if let Some(ticket) = palette.set_current_note(Some(note_id.as_str())) {
            let (ticket, similar) =
                similarity::fetch_similar(&provider, ticket, config.similarity_timeout()).await;
            palette.apply_similar(&ticket, similar);
        }
        local_similarity = Some(provider);
    }

    let now = Instant::now();
    palette.handle(NavEvent::Toggle, now);
    if let (Some(provider), Some(ticket)) = (&local_similarity, palette.take_pending_fetch()) {
        let (ticket, similar) =
            similarity::fetch_similar(provider, ticket, config.similarity_timeout()).await;
        palette.apply_similar(&ticket, similar);
    }
    browse.mount();
    let query = options.query.join(" ");
    if !query.trim().is_empty() {
        palette.handle(NavEvent::QueryChanged(query.clone()), now);
        browse.handle(NavEvent::QueryChanged(query), now);
        if let Some(settled) = palette.next_deadline() {
            palette.tick(settled);
            browse.tick(settled);
        }
    }
    print_report(&palette, &browse)?;

    if !options.watch {
        return Ok(());
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let _watcher = watcher::spawn_collection_watcher(watch_config, initial.scan_timestamp, tx);
    while let Some(update) = rx.recv().await {
        if let Some(provider) = &local_similarity {
            for id in &update.deleted {
                provider.remove(id).await;
            }
            if let Err(e) = provider.upsert(update.changed.clone()).await {
                tracing::warn!("Failed to re-embed changed notes: {e}");
            }
        }
        palette.set_notes(update.notes.clone());
        browse.set_notes(update.notes);
        print_report(&palette, &browse)?;
    }
    Ok(())
}

fn print_report(palette: &QuickOpen, browse: &BrowseView) -> Result<()> {
    let report = Report {
        suggestions: palette.suggestions(),
        palette_render: palette.render_strategy(),
        browse: browse.listing(),
        browse_render: browse.render_strategy(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
