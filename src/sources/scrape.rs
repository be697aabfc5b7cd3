//! Sitemap-driven scraping of search result pages.
//!
//! [`ScrapeSource`] binds a compiled [`Sitemap`] to a query: it renders the
//! sitemap's search URL, extracts one record per result card, and converts
//! records into content items. Optionally it follows each result link and
//! pulls paragraph text when the card itself carried no body.
//!
//! Fetching goes through the [`PageRenderer`] seam so the extraction logic
//! is testable against canned HTML and a headless-browser renderer could be
//! dropped in later.

use crate::error::{IngestError, Result};
use crate::models::ContentItem;
use crate::sitemap::Sitemap;
use crate::sources::NewsSource;
use crate::utils::{normalize_ws, parse_human_date_now};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Turning a URL into an HTML document.
#[async_trait]
pub trait PageRenderer: Send {
    async fn render(&mut self, url: &str) -> Result<String>;
}

/// Plain HTTP renderer with per-request throttling and retry backoff.
///
/// Requests through one renderer are spaced at least `request_delay` apart;
/// a failed fetch is retried with a doubling delay (capped at 30s) plus a
/// little jitter so parallel runs do not hammer a recovering site in step.
pub struct HttpRenderer {
    client: reqwest::Client,
    request_delay: Duration,
    last_request: Option<Instant>,
    max_attempts: u32,
}

impl HttpRenderer {
    pub fn new(request_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("newsfold/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            request_delay,
            last_request: None,
            max_attempts: 3,
        })
    }

    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let next_allowed = last + self.request_delay;
            let now = Instant::now();
            if next_allowed > now {
                sleep(next_allowed - now).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    async fn fetch_with_backoff(&self, url: &str) -> Result<String> {
        let mut delay = Duration::from_secs(2);
        let mut attempt = 1;
        loop {
            match self.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_attempts => {
                    let jitter = Duration::from_millis(rand::rng().random_range(0..=250));
                    warn!(
                        %url,
                        attempt,
                        retry_in = ?(delay + jitter),
                        error = %e,
                        "Fetch failed; retrying"
                    );
                    sleep(delay + jitter).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        debug!(%url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&mut self, url: &str) -> Result<String> {
        self.throttle().await;
        self.fetch_with_backoff(url).await
    }
}

/// A search-page scraper driven by one sitemap.
pub struct ScrapeSource {
    label: String,
    sitemap: Sitemap,
    renderer: Box<dyn PageRenderer>,
    query: String,
    limit: usize,
    go_detail: bool,
}

impl ScrapeSource {
    pub fn new(
        label: impl Into<String>,
        sitemap: Sitemap,
        renderer: Box<dyn PageRenderer>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            sitemap,
            renderer,
            query: query.into(),
            limit: 10,
            go_detail: false,
        }
    }

    /// Cap on how many result records become items.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Follow each result link and pull paragraph text when the result card
    /// itself had no body.
    pub fn with_go_detail(mut self, go_detail: bool) -> Self {
        self.go_detail = go_detail;
        self
    }
}

#[async_trait]
impl NewsSource for ScrapeSource {
    fn name(&self) -> &str {
        &self.label
    }

    /// Render the search page, extract records, convert, and optionally
    /// backfill bodies from detail pages. Search-page failures degrade to
    /// an empty batch; a detail-page failure only leaves that one body
    /// empty.
    #[instrument(level = "info", skip_all, fields(source = %self.label, query = %self.query))]
    async fn produce(&mut self) -> Result<Vec<ContentItem>> {
        let search_url = self.sitemap.search_url(&self.query);
        let html = match self.renderer.render(&search_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %search_url, error = %e, "Search page unreachable; producing nothing");
                return Ok(Vec::new());
            }
        };

        let base = Url::parse(&search_url)?;
        let records = self.sitemap.extract(&html);
        let total = records.len();

        let mut items = Vec::new();
        for record in records {
            if items.len() >= self.limit {
                break;
            }
            match item_from_record(&record, &base, &self.label) {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "Dropping record"),
            }
        }
        info!(extracted = total, kept = items.len(), "Converted search results");

        if self.go_detail {
            for item in items.iter_mut().filter(|i| i.body.is_empty()) {
                match self.renderer.render(&item.url).await {
                    Ok(html) => item.body = scrape_paragraphs(&html),
                    Err(e) => {
                        warn!(url = %item.url, error = %e, "Detail page unreachable; leaving body empty");
                    }
                }
            }
        }

        Ok(items)
    }
}

/// Convert one extracted record into a content item.
///
/// The record's `url` and a parseable `published_at` are mandatory; a
/// missing date means the record cannot be ordered and is dropped rather
/// than stamped with today. Relative links resolve against the search URL.
fn item_from_record(record: &Value, base: &Url, label: &str) -> Result<ContentItem> {
    let raw_url = field(record, "url")
        .ok_or_else(|| IngestError::MalformedEntry("record has no url".into()))?;
    let url = base
        .join(&raw_url)
        .map_err(|e| IngestError::MalformedEntry(format!("bad record url '{raw_url}': {e}")))?;

    let title = field(record, "title").map(|t| normalize_ws(&t)).unwrap_or_default();
    if title.is_empty() {
        return Err(IngestError::MalformedEntry(format!(
            "record at {url} has no title"
        )));
    }

    let date_text = field(record, "published_at").unwrap_or_default();
    let published_at = parse_human_date_now(&date_text).ok_or_else(|| {
        IngestError::MalformedEntry(format!(
            "record '{title}' has unparseable date '{date_text}'"
        ))
    })?;

    let source = field(record, "source")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| label.to_string());
    let body = field(record, "content").unwrap_or_default();

    Ok(ContentItem::new(title, body, url, source, published_at))
}

/// Read a string field off a record, tolerating the array shape a
/// `multiple` rule produces by taking its first element.
fn field(record: &Value, key: &str) -> Option<String> {
    match &record[key] {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

/// All paragraph text of a page, normalized, one paragraph per line.
fn scrape_paragraphs(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.select(&PARAGRAPH)
        .map(|p| normalize_ws(&p.text().collect::<String>()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
