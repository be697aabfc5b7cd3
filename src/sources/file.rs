//! Persisted article batches as a source.
//!
//! Reads items back out of a JSON batch file written by an earlier run (or
//! any compatible export). Accepts either a bare array of rows or an object
//! wrapping one under an `items` or `articles` key.

use crate::error::{IngestError, Result};
use crate::models::ContentItem;
use crate::sources::NewsSource;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// One article row as it appears on disk. `scraped_at` is optional so that
/// hand-assembled or foreign exports still load.
#[derive(Debug, Deserialize)]
struct FileRow {
    title: String,
    #[serde(default)]
    content: String,
    url: String,
    #[serde(default)]
    source: String,
    published_date: String,
    #[serde(default)]
    scraped_at: Option<DateTime<Utc>>,
}

/// A batch file of previously collected articles.
pub struct FileSource {
    path: PathBuf,
    label: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self { path, label }
    }
}

#[async_trait]
impl NewsSource for FileSource {
    fn name(&self) -> &str {
        &self.label
    }

    /// Read and convert every row in the file. A missing or unparseable
    /// file produces an empty batch; a bad row is skipped with a warning.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    async fn produce(&mut self) -> Result<Vec<ContentItem>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Batch file unreadable; producing nothing");
                return Ok(Vec::new());
            }
        };

        let rows = match batch_rows(&text) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Batch file did not parse; producing nothing");
                return Ok(Vec::new());
            }
        };

        let mut items = Vec::new();
        for row in rows {
            match item_from_row(row, &self.label) {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "Skipping bad row"),
            }
        }
        info!(count = items.len(), "Loaded articles from file");
        Ok(items)
    }
}

/// Pull the row array out of a batch document, whichever wrapping it uses.
pub(crate) fn batch_rows(text: &str) -> Result<Vec<Value>> {
    let doc: Value = serde_json::from_str(text)?;
    match doc {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => {
            for key in ["items", "articles"] {
                if let Some(Value::Array(rows)) = map.remove(key) {
                    return Ok(rows);
                }
            }
            Err(IngestError::MalformedEntry(
                "batch object has no items or articles array".into(),
            ))
        }
        _ => Err(IngestError::MalformedEntry(
            "batch document is neither an array nor an object".into(),
        )),
    }
}

fn item_from_row(row: Value, fallback_source: &str) -> Result<ContentItem> {
    let row: FileRow = serde_json::from_value(row)?;
    let published_at: NaiveDate = row
        .published_date
        .parse()
        .map_err(|_| {
            IngestError::MalformedEntry(format!(
                "row '{}' has unparseable published_date '{}'",
                row.title, row.published_date
            ))
        })?;

    let source = if row.source.is_empty() {
        fallback_source.to_string()
    } else {
        row.source
    };

    let mut item = ContentItem::new(row.title, row.content, row.url, source, published_at);
    if let Some(scraped_at) = row.scraped_at {
        item.retrieved_at = scraped_at;
    }
    Ok(item)
}
