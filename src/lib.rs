//! Topic-driven news collection: pull items from feeds, OPML bundles,
//! stored archives, and sitemap-driven scrapers, fold near-duplicate
//! stories into merged items, and persist the batch as JSON.
//!
//! The pipeline is three stages with one seam each:
//!
//! 1. **Collect**: every producer implements [`sources::NewsSource`] and
//!    aggregation is just another source ([`sources::SourceAggregator`]).
//! 2. **Fold**: [`dedup::Deduplicator`] clusters items by TF-IDF cosine
//!    similarity and merges each cluster into one item with provenance.
//! 3. **Persist**: [`outputs::write_batch`] writes a dated JSON batch
//!    that [`sources::FileSource`] can read back in a later run.

pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod models;
pub mod outputs;
pub mod sitemap;
pub mod sources;
pub mod utils;

pub use error::{IngestError, Result};
