//! Full-text search over previously stored articles.
//!
//! [`SearchIndex`] is the seam: anything that can answer a query with
//! stored rows plugs in behind it. The shipped implementation,
//! [`FileIndex`], does case-insensitive substring matching over a batch
//! file; enough for local archives, and the trait keeps the door open for
//! a real index without touching the source.

use crate::error::Result;
use crate::models::ContentItem;
use crate::sources::file::batch_rows;
use crate::sources::NewsSource;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// A stored article as the index returns it. Dates stay textual here; the
/// source is where the strict parse (and the drop on failure) happens.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredArticle {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
    #[serde(default)]
    pub source: String,
    pub published_date: String,
}

/// Answering queries over stored articles.
pub trait SearchIndex: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<StoredArticle>>;
}

/// A search query bound to an index, producing the matching articles.
pub struct SearchSource {
    index: Box<dyn SearchIndex>,
    query: String,
}

impl SearchSource {
    pub fn new(index: Box<dyn SearchIndex>, query: impl Into<String>) -> Self {
        Self {
            index,
            query: query.into(),
        }
    }
}

#[async_trait]
impl NewsSource for SearchSource {
    fn name(&self) -> &str {
        "Search"
    }

    /// Run the query and convert the hits. A row whose stored date is not
    /// `YYYY-MM-DD` is dropped with a warning: persisted rows wrote that
    /// format, so anything else is corruption, not a format variant.
    #[instrument(level = "info", skip_all, fields(query = %self.query))]
    async fn produce(&mut self) -> Result<Vec<ContentItem>> {
        let hits = match self.index.search(&self.query) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Search index failed; producing nothing");
                return Ok(Vec::new());
            }
        };

        let mut items = Vec::new();
        for hit in hits {
            let Ok(published_at) = hit.published_date.parse::<NaiveDate>() else {
                warn!(
                    title = %hit.title,
                    date = %hit.published_date,
                    "Stored row has unparseable date; dropping"
                );
                continue;
            };
            let source = if hit.source.is_empty() {
                "Search".to_string()
            } else {
                hit.source
            };
            items.push(ContentItem::new(
                hit.title,
                hit.content,
                hit.url,
                source,
                published_at,
            ));
        }
        info!(count = items.len(), "Search produced items");
        Ok(items)
    }
}

/// File-backed index: loads a batch file once and matches queries as
/// case-insensitive substrings over title and content.
pub struct FileIndex {
    rows: Vec<StoredArticle>,
}

impl FileIndex {
    /// Load the index from a batch file on disk.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a recognizable batch
    /// document. Individual bad rows are skipped with a warning.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let text = tokio::fs::read_to_string(&path).await?;
        let index = Self::from_str(&text)?;
        info!(path = %path.display(), rows = index.rows.len(), "Loaded search index");
        Ok(index)
    }

    pub fn from_str(text: &str) -> Result<Self> {
        let mut rows = Vec::new();
        for row in batch_rows(text)? {
            match serde_json::from_value::<StoredArticle>(row) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(error = %e, "Skipping unindexable row"),
            }
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SearchIndex for FileIndex {
    fn search(&self, query: &str) -> Result<Vec<StoredArticle>> {
        let needle = query.to_lowercase();
        Ok(self
            .rows
            .iter()
            .filter(|row| {
                row.title.to_lowercase().contains(&needle)
                    || row.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;

    const BATCH: &str = r#"{"items": [
      {"title": "Wind farm approved", "content": "Offshore turbines near the coast.",
       "url": "https://example.com/wind", "source": "Wire", "published_date": "2024-04-01"},
      {"title": "Markets steady", "content": "Nothing about energy here.",
       "url": "https://example.com/markets", "source": "Wire", "published_date": "2024-04-02"},
      {"title": "Solar subsidy", "content": "New TURBINE and panel incentives.",
       "url": "https://example.com/solar", "source": "", "published_date": "2024-04-03"},
      {"title": "Corrupted", "content": "turbine", "url": "https://example.com/bad",
       "source": "Wire", "published_date": "April"}
    ]}"#;

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let index = FileIndex::from_str(BATCH).unwrap();
        let hits = index.search("turbine").unwrap();
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Wind farm approved", "Solar subsidy", "Corrupted"]);
    }

    #[test]
    fn test_title_match_counts() {
        let index = FileIndex::from_str(BATCH).unwrap();
        let hits = index.search("markets").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://example.com/markets");
    }

    #[tokio::test]
    async fn test_source_drops_rows_with_bad_dates() {
        let index = FileIndex::from_str(BATCH).unwrap();
        let mut source = SearchSource::new(Box::new(index), "turbine");
        let items = source.produce().await.unwrap();
        // "Corrupted" matched but its date is not a calendar date.
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Wind farm approved");
        assert_eq!(items[1].title, "Solar subsidy");
        assert_eq!(items[1].source_name, "Search");
    }

    #[tokio::test]
    async fn test_failing_index_degrades_to_empty() {
        struct Down;
        impl SearchIndex for Down {
            fn search(&self, _query: &str) -> Result<Vec<StoredArticle>> {
                Err(IngestError::SourceUnavailable("index offline".into()))
            }
        }
        let mut source = SearchSource::new(Box::new(Down), "anything");
        assert!(source.produce().await.unwrap().is_empty());
    }

    #[test]
    fn test_no_matches_is_empty() {
        let index = FileIndex::from_str(BATCH).unwrap();
        assert!(index.search("zebra").unwrap().is_empty());
    }
}
