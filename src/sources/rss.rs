//! RSS/Atom feed source.
//!
//! Fetches a feed URL and turns each entry into a [`ContentItem`]. Entries
//! prefer the full content body over the summary when both are present.
//! Publication dates are integrity-bearing (chronological ordering is a
//! downstream guarantee), so an entry without a parseable date is skipped,
//! never defaulted to "now".

use crate::error::Result;
use crate::models::ContentItem;
use crate::sources::NewsSource;
use crate::utils::normalize_ws;
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

/// One RSS or Atom feed.
pub struct RssSource {
    feed_url: String,
    label: String,
}

impl RssSource {
    pub fn new(feed_url: impl Into<String>) -> Self {
        let feed_url = feed_url.into();
        let label = fallback_label(&feed_url);
        Self { feed_url, label }
    }

    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }
}

/// Derive a display label from the feed URL's host, used until (or unless)
/// the feed declares its own title.
fn fallback_label(feed_url: &str) -> String {
    url::Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| feed_url.to_string())
}

/// Convert a fetched feed document into content items.
///
/// A parse failure yields an empty batch; entries missing a title, link, or
/// publication date are dropped with a warning, siblings unaffected.
fn items_from_feed(body: &str, label: &str) -> Vec<ContentItem> {
    let feed = match feed_rs::parser::parse(body.as_bytes()) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(error = %e, "Feed did not parse; producing nothing");
            return Vec::new();
        }
    };

    let source_name = feed
        .title
        .map(|t| normalize_ws(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| label.to_string());

    let mut items = Vec::new();
    for entry in feed.entries {
        let title = entry
            .title
            .as_ref()
            .map(|t| normalize_ws(&t.content))
            .unwrap_or_default();
        if title.is_empty() {
            warn!(entry = %entry.id, "Entry has no title; skipping");
            continue;
        }

        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            warn!(%title, "Entry has no link; skipping");
            continue;
        };

        // Prefer the full content body over the summary.
        let body = entry
            .content
            .and_then(|c| c.body)
            .or_else(|| entry.summary.map(|s| s.content))
            .unwrap_or_default();

        let Some(published) = entry.published.or(entry.updated) else {
            warn!(%title, "Entry has no publication date; skipping");
            continue;
        };

        items.push(ContentItem::new(
            title,
            body,
            link,
            source_name.clone(),
            published.date_naive(),
        ));
    }

    info!(source = %source_name, count = items.len(), "Parsed feed entries");
    items
}

#[async_trait]
impl NewsSource for RssSource {
    fn name(&self) -> &str {
        &self.label
    }

    /// Fetch and parse the feed. A fetch or parse failure degrades to an
    /// empty batch rather than an error.
    #[instrument(level = "info", skip_all, fields(feed = %self.feed_url))]
    async fn produce(&mut self) -> Result<Vec<ContentItem>> {
        let body = match fetch_feed(&self.feed_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Feed unreachable; producing nothing");
                return Ok(Vec::new());
            }
        };

        Ok(items_from_feed(&body, &self.label))
    }
}

async fn fetch_feed(feed_url: &str) -> Result<String> {
    let response = reqwest::get(feed_url).await?.error_for_status()?;
    let body = response.text().await?;
    debug!(bytes = body.len(), "Fetched feed body");
    Ok(body)
}
