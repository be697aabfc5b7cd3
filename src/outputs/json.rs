//! JSON batch output.
//!
//! One run writes one file: `{out_dir}/{YYYY-MM-DD}/{topic-slug}.json`,
//! where the date directory is the run day. The payload wraps the items
//! with enough metadata to read the file back later without context.

use crate::error::Result;
use crate::models::Deduped;
use crate::utils::slugify_topic;
use chrono::{Local, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Serialize)]
struct Batch<'a> {
    topic: &'a str,
    item_count: usize,
    generated_at: chrono::DateTime<Utc>,
    items: &'a [Deduped],
}

/// Write a finished batch under a dated directory and return the path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written. Serialization of the payload itself does not fail for the
/// types involved, but a failure would be reported the same way.
#[instrument(level = "info", skip(items), fields(topic = %topic, count = items.len()))]
pub async fn write_batch(out_dir: &Path, topic: &str, items: &[Deduped]) -> Result<PathBuf> {
    let day = Local::now().format("%Y-%m-%d").to_string();
    let dir = out_dir.join(day);
    fs::create_dir_all(&dir).await?;

    let batch = Batch {
        topic,
        item_count: items.len(),
        generated_at: Utc::now(),
        items,
    };
    let payload = serde_json::to_string_pretty(&batch)?;

    let path = dir.join(format!("{}.json", slugify_topic(topic)));
    if let Err(e) = fs::write(&path, payload).await {
        error!(path = %path.display(), error = %e, "Failed to write batch");
        return Err(e.into());
    }
    info!(path = %path.display(), "Wrote batch");
    Ok(path)
}
