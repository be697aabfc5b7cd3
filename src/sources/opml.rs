//! OPML subscription bundles.
//!
//! An OPML document is a tree of `<outline>` elements; the ones that carry
//! an `xmlUrl` attribute are feed subscriptions. The bundle keeps only URLs
//! that look like actual feeds (ending in `.xml` or mentioning `rss`);
//! exported subscription lists routinely mix in site homepages and HTML
//! category pages that would waste a fetch each.

use crate::error::{IngestError, Result};
use crate::models::ContentItem;
use crate::sources::rss::RssSource;
use crate::sources::{NewsSource, SourceAggregator};
use async_trait::async_trait;
use itertools::Itertools;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;
use tracing::{info, instrument, warn};

/// A bundle of RSS sources loaded from one OPML document.
pub struct OpmlBundle {
    aggregator: SourceAggregator,
}

impl OpmlBundle {
    /// Parse an OPML document and build one [`RssSource`] per surviving
    /// feed URL. Duplicate URLs collapse to one source.
    ///
    /// # Errors
    ///
    /// Fails if the document is not well-formed XML. A document with no
    /// qualifying feed URLs is not an error; the bundle is just empty.
    pub fn from_str(opml: &str, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let urls = feed_urls(opml)?;
        let mut aggregator = SourceAggregator::new(label.clone());
        for url in &urls {
            aggregator.push(Box::new(RssSource::new(url)));
        }
        info!(bundle = %label, feeds = urls.len(), "Loaded OPML bundle");
        Ok(Self { aggregator })
    }

    /// Load an OPML document from disk. The file stem becomes the bundle
    /// label.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "opml".to_string());
        let opml = tokio::fs::read_to_string(path).await?;
        Self::from_str(&opml, label)
    }

    pub fn len(&self) -> usize {
        self.aggregator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregator.is_empty()
    }
}

#[async_trait]
impl NewsSource for OpmlBundle {
    fn name(&self) -> &str {
        self.aggregator.name()
    }

    async fn produce(&mut self) -> Result<Vec<ContentItem>> {
        self.aggregator.produce().await
    }
}

/// Extract qualifying feed URLs from an OPML document, in document order,
/// deduplicated.
#[instrument(level = "debug", skip_all)]
fn feed_urls(opml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(opml);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() != b"outline" {
                    continue;
                }
                // xmlUrl is the subscription attribute; some exporters only
                // set url.
                let mut xml_url = None;
                let mut plain_url = None;
                for attr in e.attributes().flatten() {
                    let value = match attr.unescape_value() {
                        Ok(v) => v.into_owned(),
                        Err(e) => {
                            warn!(error = %e, "Unreadable outline attribute; skipping");
                            continue;
                        }
                    };
                    match attr.key.as_ref() {
                        b"xmlUrl" => xml_url = Some(value),
                        b"url" => plain_url = Some(value),
                        _ => {}
                    }
                }
                if let Some(url) = xml_url.or(plain_url) {
                    if looks_like_feed(&url) {
                        urls.push(url);
                    } else {
                        warn!(%url, "Outline URL does not look like a feed; skipping");
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(IngestError::MalformedEntry(format!(
                    "OPML parse error at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    Ok(urls.into_iter().unique().collect())
}

fn looks_like_feed(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.ends_with(".xml") || lower.contains("rss")
}
