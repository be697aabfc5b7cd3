//! Persistence of finished batches.

pub mod json;

pub use json::write_batch;
