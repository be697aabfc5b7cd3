//! Content sources and their aggregation.
//!
//! Everything that can produce news content implements the single
//! [`NewsSource`] capability: RSS feeds, OPML bundles of feeds, persisted
//! article files, search-index adapters, and sitemap-driven scrapers. The
//! pipeline composes them as trait objects; there is no hierarchy, just
//! one method.
//!
//! # Failure policy
//!
//! A malformed individual entry is skipped with a logged warning; a source
//! that cannot be opened at all returns an empty batch instead of an error,
//! so aggregating over many sources degrades gracefully. The
//! [`SourceAggregator`] additionally catches members that do return errors,
//! logs them, and moves on, so one broken feed never starves the rest.

use crate::error::Result;
use crate::models::ContentItem;
use async_trait::async_trait;
use tracing::{info, warn};

pub mod file;
pub mod opml;
pub mod rss;
pub mod scrape;
pub mod search;

pub use file::FileSource;
pub use opml::OpmlBundle;
pub use rss::RssSource;
pub use scrape::{HttpRenderer, PageRenderer, ScrapeSource};
pub use search::{FileIndex, SearchIndex, SearchSource, StoredArticle};

/// The one capability every content source provides.
///
/// `produce` yields a finite batch of items, single pass; a source is not
/// restartable unless reconstructed (re-parsing the feed URL, re-opening
/// the file). `&mut self` reflects that producing may consume state: a
/// renderer session, a seen-set, a one-shot file read.
#[async_trait]
pub trait NewsSource: Send {
    /// Human-readable label for logs and diagnostics.
    fn name(&self) -> &str;

    /// Fetch and normalize everything this source currently has.
    async fn produce(&mut self) -> Result<Vec<ContentItem>>;
}

/// Sequential fan-out over several sources. No dedup, no reordering, no
/// parallelism. Member order is fixed, which also bounds the outbound
/// request rate to one source at a time.
pub struct SourceAggregator {
    name: String,
    sources: Vec<Box<dyn NewsSource>>,
}

impl SourceAggregator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
        }
    }

    pub fn push(&mut self, source: Box<dyn NewsSource>) {
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: Box<dyn NewsSource>) -> Self {
        self.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl NewsSource for SourceAggregator {
    fn name(&self) -> &str {
        &self.name
    }

    /// Drain every member exactly once, in order, concatenating their
    /// batches. A member that returns an error is logged and skipped; the
    /// remaining members still contribute all their items.
    async fn produce(&mut self) -> Result<Vec<ContentItem>> {
        let mut items = Vec::new();
        for source in &mut self.sources {
            match source.produce().await {
                Ok(batch) => {
                    info!(
                        source = source.name(),
                        count = batch.len(),
                        "Source produced items"
                    );
                    items.extend(batch);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Source failed; skipping");
                }
            }
        }
        info!(aggregator = %self.name, total = items.len(), "Aggregation complete");
        Ok(items)
    }
}
