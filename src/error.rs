//! Error taxonomy for the ingestion pipeline.
//!
//! The variants mirror how failures are handled rather than where they occur:
//! a [`IngestError::SourceUnavailable`] degrades one source to an empty batch,
//! a [`IngestError::MalformedEntry`] drops one entry, a [`IngestError::Sitemap`]
//! is fatal at extractor construction, and a [`IngestError::Vectorization`]
//! turns a whole deduplication call into a no-op.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A source could not be opened at all (network or parse failure).
    /// Callers degrade the source to an empty sequence and continue.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single feed entry or scraped record failed extraction. The entry
    /// is dropped; its siblings are unaffected.
    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    /// The sitemap selector tree is invalid (unknown parent id, bad
    /// selector, missing record node). Fatal at construction; the tree is
    /// static and reused across extractions.
    #[error("sitemap error: {0}")]
    Sitemap(String),

    /// The dedup corpus could not be vectorized. The whole call degrades
    /// to the identity rather than risking a partial merge.
    #[error("vectorization failed: {0}")]
    Vectorization(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
