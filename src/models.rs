//! Data models for ingested news content and its consolidated representations.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`ContentItem`]: the canonical unit of content every source produces
//! - [`MergedItem`]: a cluster of near-duplicate items folded into one record
//! - [`Deduped`]: an element of the deduplicator's output, either an untouched
//!   item or a merged one
//!
//! Field names are mapped with serde renames to the JSON shape consumed by
//! downstream report generators: `content`, `source`, `published_date`
//! (`YYYY-MM-DD`) and `scraped_at` (ISO-8601).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The canonical unit of content, regardless of which source produced it.
///
/// Two items with the same `url` refer to the same resource; `url` is never
/// empty for an item that reaches deduplication or persistence. By the time
/// an item leaves the ingestion layer, `published_at` is a real calendar
/// date, never a free-text string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// The article title or headline. Non-empty after normalization.
    pub title: String,
    /// The article text. May be empty until a detail-page fetch fills it in.
    #[serde(rename = "content")]
    pub body: String,
    /// The canonical URL of the article; its de-facto identity.
    pub url: String,
    /// Label of the origin (feed title, site name, "Search").
    #[serde(rename = "source")]
    pub source_name: String,
    /// Publication date. Required; sources drop entries they cannot date.
    #[serde(rename = "published_date")]
    pub published_at: NaiveDate,
    /// When this item was retrieved. Set once at construction.
    #[serde(rename = "scraped_at")]
    pub retrieved_at: DateTime<Utc>,
}

impl ContentItem {
    /// Build an item with `retrieved_at` stamped from the wall clock.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
        source_name: impl Into<String>,
        published_at: NaiveDate,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            url: url.into(),
            source_name: source_name.into(),
            published_at,
            retrieved_at: Utc::now(),
        }
    }

    /// The text used for similarity comparison: title plus the first 500
    /// characters of the body.
    pub fn comparison_text(&self) -> String {
        let head: String = self.body.chars().take(500).collect();
        format!("{} {}", self.title, head)
    }
}

/// A set of near-duplicate items folded into one consolidated record.
///
/// The representative `item` carries the longest body among the members
/// (first occurrence wins ties) and the earliest publication date. The
/// remaining fields record where the coverage came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedItem {
    /// Representative content, flattened into the same JSON shape as a
    /// plain [`ContentItem`].
    #[serde(flatten)]
    pub item: ContentItem,
    /// Every source name that covered the story.
    pub sources: BTreeSet<String>,
    /// Member URLs in their original input order.
    pub source_urls: Vec<String>,
    /// Marker for downstream consumers. Always `true`.
    pub is_merged: bool,
    /// Number of members folded into this record. Always >= 2.
    pub merged_count: usize,
}

/// One element of the deduplicator's output.
///
/// Items that matched nothing pass through unchanged as [`Deduped::Single`];
/// each surviving cluster becomes one [`Deduped::Merged`] at the position of
/// its anchor. Serializes untagged, so singles keep the plain item shape.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Deduped {
    Merged(MergedItem),
    Single(ContentItem),
}

impl Deduped {
    /// The content record, whichever variant carries it.
    pub fn item(&self) -> &ContentItem {
        match self {
            Deduped::Merged(m) => &m.item,
            Deduped::Single(i) => i,
        }
    }
}
