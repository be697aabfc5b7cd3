//! Run configuration.
//!
//! A YAML file names the sources a run draws from: direct feed URLs, OPML
//! bundle files, sitemap scrapers, and an optional stored-article file that
//! doubles as the search index. Everything has a sensible default so a
//! minimal config is just a list of feeds.

use crate::error::{IngestError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

fn default_threshold() -> f64 {
    0.85
}

fn default_request_delay_ms() -> u64 {
    2000
}

fn default_scrape_limit() -> usize {
    10
}

/// One sitemap-driven scraper.
#[derive(Debug, Deserialize)]
pub struct SitemapConfig {
    /// Path to the sitemap JSON file.
    pub path: PathBuf,
    /// Display name; defaults to the sitemap file stem.
    #[serde(default)]
    pub name: Option<String>,
    /// Maximum results taken from the search page.
    #[serde(default = "default_scrape_limit")]
    pub limit: usize,
    /// Follow result links to backfill missing bodies.
    #[serde(default)]
    pub go_detail: bool,
}

impl SitemapConfig {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "scraper".to_string())
        })
    }
}

/// Everything one run needs to know about its sources and tuning.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Direct RSS/Atom feed URLs.
    #[serde(default)]
    pub feeds: Vec<String>,
    /// OPML subscription files.
    #[serde(default)]
    pub opml: Vec<PathBuf>,
    /// Sitemap-driven scrapers.
    #[serde(default)]
    pub sitemaps: Vec<SitemapConfig>,
    /// Stored-article batch file, used both as a plain source and as the
    /// search index.
    #[serde(default)]
    pub articles_file: Option<PathBuf>,
    /// Cosine similarity at or above which two items are considered the
    /// same story.
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    /// Minimum spacing between outbound scraper requests.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            opml: Vec::new(),
            sitemaps: Vec::new(),
            articles_file: None,
            similarity_threshold: default_threshold(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl RunConfig {
    pub fn from_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| IngestError::MalformedEntry(format!("invalid config: {e}")))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path).await?;
        let config = Self::from_str(&yaml)?;
        info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            opml = config.opml.len(),
            sitemaps = config.sitemaps.len(),
            "Loaded config"
        );
        Ok(config)
    }
}
