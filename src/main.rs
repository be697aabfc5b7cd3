//! # Newsfold
//!
//! A topic-driven news collection pipeline that pulls items from RSS/Atom
//! feeds, OPML subscription bundles, stored article archives, and
//! sitemap-driven scrapers, folds near-duplicate stories into merged items,
//! and writes the result as a dated JSON batch.
//!
//! ## Usage
//!
//! ```sh
//! newsfold "climate change" -c newsfold.yaml -o ./output
//! ```
//!
//! ## Architecture
//!
//! The run is a straight pipeline:
//! 1. **Collect**: every configured source produces its items in turn
//! 2. **Filter**: broadcast sources (feeds, archives) are narrowed to the
//!    topic; query-driven sources already are
//! 3. **Fold**: TF-IDF cosine clustering merges near-duplicate stories
//! 4. **Persist**: one JSON batch file under a dated directory

use clap::Parser;
use newsfold::cli::Cli;
use newsfold::config::RunConfig;
use newsfold::dedup::Deduplicator;
use newsfold::models::ContentItem;
use newsfold::outputs::write_batch;
use newsfold::sitemap::Sitemap;
use newsfold::sources::{
    FileIndex, FileSource, HttpRenderer, NewsSource, OpmlBundle, RssSource, ScrapeSource,
    SearchSource, SourceAggregator,
};
use newsfold::utils::ensure_writable_dir;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsfold starting up");

    let args = Cli::parse();
    debug!(?args.topic, ?args.config, ?args.out_dir, "Parsed CLI arguments");

    let config = RunConfig::from_file(&args.config).await?;
    ensure_writable_dir(&args.out_dir).await?;

    // --- Assemble sources ---
    // Broadcast sources carry whatever they have; their items get the topic
    // filter below. Query-driven sources are asked for the topic directly.
    let mut broadcast = SourceAggregator::new("broadcast");
    for feed in &config.feeds {
        broadcast.push(Box::new(RssSource::new(feed)));
    }
    for path in &config.opml {
        match OpmlBundle::from_file(path).await {
            Ok(bundle) => broadcast.push(Box::new(bundle)),
            Err(e) => warn!(path = %path.display(), error = %e, "OPML bundle unreadable; skipping"),
        }
    }
    if let Some(ref path) = config.articles_file {
        broadcast.push(Box::new(FileSource::new(path)));
    }

    let mut queried = SourceAggregator::new("queried");
    if let Some(ref path) = config.articles_file {
        match FileIndex::from_file(path).await {
            Ok(index) => {
                queried.push(Box::new(SearchSource::new(Box::new(index), &args.topic)));
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Search index unavailable; skipping"),
        }
    }
    let request_delay = Duration::from_millis(config.request_delay_ms);
    for scraper in &config.sitemaps {
        // A sitemap that does not compile is a configuration bug, not a
        // transient source failure.
        let sitemap = Sitemap::from_file(&scraper.path)?;
        let renderer = HttpRenderer::new(request_delay)?;
        let source = ScrapeSource::new(
            scraper.display_name(),
            sitemap,
            Box::new(renderer),
            &args.topic,
        )
        .with_limit(args.limit.unwrap_or(scraper.limit))
        .with_go_detail(scraper.go_detail || args.go_detail);
        queried.push(Box::new(source));
    }

    info!(
        broadcast = broadcast.len(),
        queried = queried.len(),
        topic = %args.topic,
        "Sources assembled"
    );

    // --- Collect ---
    let mut items = broadcast.produce().await?;
    let collected_broadcast = items.len();
    items.retain(|item| matches_topic(item, &args.topic));
    info!(
        collected = collected_broadcast,
        on_topic = items.len(),
        "Filtered broadcast items by topic"
    );
    items.extend(queried.produce().await?);
    info!(total = items.len(), "Collection complete");

    // --- Fold duplicates ---
    let threshold = args.threshold.unwrap_or(config.similarity_threshold);
    let deduped = Deduplicator::new(threshold).deduplicate(items);
    let merged = deduped
        .iter()
        .filter(|d| matches!(d, newsfold::models::Deduped::Merged(_)))
        .count();
    info!(
        items = deduped.len(),
        merged,
        threshold,
        "Deduplication complete"
    );

    // --- Persist ---
    let path = write_batch(&args.out_dir, &args.topic, &deduped).await?;
    info!(
        path = %path.display(),
        elapsed = ?start_time.elapsed(),
        "newsfold finished"
    );
    Ok(())
}

/// Case-insensitive substring match over title and body.
fn matches_topic(item: &ContentItem, topic: &str) -> bool {
    let needle = topic.to_lowercase();
    item.title.to_lowercase().contains(&needle) || item.body.to_lowercase().contains(&needle)
}
